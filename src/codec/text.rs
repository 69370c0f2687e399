//! Line-oriented text codecs: url, txt, csv, landmarks, FDDB and ARFF.
//!
//! These are pure conversions between records and lines; buffering, file
//! handles and progress are handled by the gallery backends.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::core::{Record, Value, LABEL_KEY, POINTS_KEY, RECTS_KEY};
use crate::util::{Error, Point, Rect, Result};

use super::universal::URL_KEY;

// ============================================================================
// url
// ============================================================================

/// One URL per line. Blank lines give an empty record.
pub fn parse_url_line(line: &str) -> Record {
    let url = line.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut record = Record::default();
    if !url.is_empty() {
        record.metadata.set(URL_KEY, url);
    }
    record
}

/// `URL` metadata, falling back to the record name. `None` if both are empty.
pub fn format_url_line(record: &Record) -> Option<String> {
    let url = record
        .metadata
        .get_string(URL_KEY)
        .unwrap_or_else(|| record.name.clone());
    (!url.is_empty()).then(|| format!("{}\n", url))
}

// ============================================================================
// txt
// ============================================================================

/// `<file>` or `<file> <label>`, split at the last space.
pub fn parse_txt_line(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match line.rsplit_once(' ') {
        Some((name, label)) => Record::with_label(name, label),
        None => Record::new(line),
    })
}

/// File name, optionally followed by the value stored under `label_key`.
pub fn format_txt_line(record: &Record, label_key: Option<&str>) -> String {
    match label_key.filter(|k| !k.is_empty()) {
        Some(key) => {
            let label = record
                .metadata
                .get(key)
                .map(Value::to_plain_string)
                .unwrap_or_default();
            format!("{} {}\n", record.name, label)
        }
        None => format!("{}\n", record.name),
    }
}

// ============================================================================
// csv
// ============================================================================

/// Header cell of the file-name column.
pub const CSV_FILE_COLUMN: &str = "File";

/// Split on commas, trimming surrounding whitespace.
pub fn split_csv(line: &str) -> Vec<String> {
    line.trim().split(',').map(|w| w.trim().to_string()).collect()
}

/// Build a record from a row; rows whose width differs from the header are
/// skipped.
pub fn parse_csv_row(headers: &[String], line: &str) -> Option<Record> {
    let words = split_csv(line);
    if words.len() != headers.len() || words.is_empty() {
        return None;
    }
    let mut words = words.into_iter();
    let mut record = Record::new(words.next().unwrap_or_default());
    for (key, word) in headers[1..].iter().zip(words) {
        record.metadata.set(key.as_str(), word);
    }
    Some(record)
}

/// Column layout of one metadata key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CsvKind {
    Scalar,
    Point,
    Rect,
}

impl CsvKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Point(_) => Self::Point,
            Value::Rect(_) => Self::Rect,
            _ => Self::Scalar,
        }
    }

    fn header(self, key: &str) -> String {
        match self {
            Self::Scalar => key.to_string(),
            Self::Point => format!("{0}_X,{0}_Y", key),
            Self::Rect => format!("{0}_X,{0}_Y,{0}_Width,{0}_Height", key),
        }
    }

    fn width(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Point => 2,
            Self::Rect => 4,
        }
    }
}

/// Render a full CSV table. Columns are the union of all metadata keys in
/// sorted order, typed by the first record that carries them. `Points` and
/// `Rects` are not emitted; missing values become `nan`.
pub fn render_csv(records: &[Record]) -> Result<String> {
    let mut columns: BTreeMap<&str, CsvKind> = BTreeMap::new();
    for record in records {
        for (key, value) in record.metadata.iter() {
            if key != POINTS_KEY && key != RECTS_KEY {
                columns.entry(key).or_insert_with(|| CsvKind::of(value));
            }
        }
    }

    let mut out = String::new();
    out.push_str(CSV_FILE_COLUMN);
    for (key, kind) in &columns {
        out.push(',');
        out.push_str(&kind.header(key));
    }
    out.push('\n');

    for record in records {
        out.push_str(&record.name);
        for (key, kind) in &columns {
            out.push(',');
            match record.metadata.get(key) {
                None => out.push_str(&vec!["nan"; kind.width()].join(",")),
                Some(value) => {
                    if CsvKind::of(value) != *kind {
                        return Err(Error::invalid(format!(
                            "inconsistent datatype for key {}, csv file cannot be generated",
                            key
                        )));
                    }
                    let written = match value {
                        Value::Point(p) => write!(out, "{},{}", p.x, p.y),
                        Value::Rect(r) => write!(out, "{},{},{},{}", r.x, r.y, r.width, r.height),
                        other => write!(out, "{}", other.to_plain_string()),
                    };
                    written.map_err(|e| Error::invalid(e.to_string()))?;
                }
            }
        }
        out.push('\n');
    }
    Ok(out)
}

// ============================================================================
// landmarks
// ============================================================================

/// `file:x1,y1,...,xn,yn`.
pub fn parse_landmarks_line(line: &str) -> Result<Record> {
    let words: Vec<&str> = line.split(':').collect();
    if words.len() != 2 {
        return Err(Error::malformed(format!("expected exactly one ':' in: {}", line)));
    }
    let values = words[1]
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| Error::malformed(format!("bad landmark value '{}'", v)))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.len() % 2 != 0 {
        return Err(Error::malformed(
            "expected an even number of comma-separated values",
        ));
    }
    let mut record = Record::new(words[0]);
    record.set_points(
        values
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0], xy[1]))
            .collect(),
    );
    Ok(record)
}

// ============================================================================
// FDDB
// ============================================================================

/// Metadata key of FDDB detections.
pub const FACE_KEY: &str = "Face";
pub const CONFIDENCE_KEY: &str = "Confidence";

/// Parse an FDDB detection list: file name, detection count, then one line
/// per detection. Five fields are a rectangle plus confidence; six fields are
/// an ellipse (`major minor angle cx cy confidence`) converted to the
/// bounding square of its major radius.
pub fn parse_fddb(text: &str) -> Result<Vec<Record>> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut records = Vec::new();

    while let Some(file) = lines.next() {
        let count: usize = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| Error::malformed(format!("missing detection count for {}", file)))?;

        for _ in 0..count {
            let line = lines
                .next()
                .ok_or_else(|| Error::malformed(format!("missing detection for {}", file)))?;
            let fields = line
                .split_whitespace()
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|_| Error::malformed(format!("bad FDDB field '{}'", f)))
                })
                .collect::<Result<Vec<_>>>()?;

            let (face, confidence) = match fields.as_slice() {
                [x, y, w, h, c] => (Rect::new(*x, *y, *w, *h), *c),
                [radius, _, _, cx, cy, c] => (Rect::around(Point::new(*cx, *cy), *radius), *c),
                _ => return Err(Error::malformed("unknown FDDB annotation format")),
            };

            let mut record = Record::new(file);
            record.metadata.set(FACE_KEY, vec![face]);
            record.metadata.set(CONFIDENCE_KEY, confidence);
            record.metadata.set(LABEL_KEY, "face");
            records.push(record);
        }
    }
    Ok(records)
}

// ============================================================================
// ARFF
// ============================================================================

/// ARFF preamble for `dimensions` real attributes plus a string class.
pub fn arff_header(dimensions: usize) -> String {
    let mut out = String::from("% gallery records\n@RELATION gallery\n\n");
    for i in 0..dimensions {
        out.push_str(&format!("@ATTRIBUTE v{} REAL\n", i));
    }
    out.push_str("@ATTRIBUTE class string\n\n@DATA\n");
    out
}

/// Flattened matrix values followed by the quoted label.
pub fn arff_row(record: &Record) -> String {
    let mut cells: Vec<String> = record
        .matrix
        .as_ref()
        .map(|m| m.to_f64_vec().iter().map(f64::to_string).collect())
        .unwrap_or_default();
    cells.push(format!("'{}'", record.label().unwrap_or_default()));
    format!("{}\n", cells.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Matrix;

    #[test]
    fn test_url_lines() {
        let r = parse_url_line("  http://x/a.jpg \n");
        assert_eq!(r.metadata.get_string(URL_KEY).as_deref(), Some("http://x/a.jpg"));
        assert!(parse_url_line("\n").metadata.is_empty());
        assert_eq!(format_url_line(&Record::new("a.jpg")).as_deref(), Some("a.jpg\n"));
        assert_eq!(format_url_line(&Record::default()), None);
    }

    #[test]
    fn test_txt_lines() {
        let r = parse_txt_line("my photos/a.jpg alice\n").unwrap();
        assert_eq!(r.name, "my photos/a.jpg");
        assert_eq!(r.label().as_deref(), Some("alice"));
        assert_eq!(parse_txt_line("a.jpg").unwrap().label(), None);
        assert!(parse_txt_line("   ").is_none());

        let r = Record::with_label("a.jpg", "bob");
        assert_eq!(format_txt_line(&r, Some("Label")), "a.jpg bob\n");
        assert_eq!(format_txt_line(&r, None), "a.jpg\n");
    }

    #[test]
    fn test_csv_render_and_parse() {
        let a = Record::with_label("a.jpg", "x").with("Eye", Point::new(1.0, 2.0));
        let mut b = Record::with_label("b.jpg", "y").with("Box", Rect::new(1.0, 2.0, 3.0, 4.0));
        b.set_points(vec![Point::new(0.0, 0.0)]);

        let csv = render_csv(&[a, b]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "File,Box_X,Box_Y,Box_Width,Box_Height,Eye_X,Eye_Y,Label");
        assert_eq!(lines[1], "a.jpg,nan,nan,nan,nan,1,2,x");
        assert_eq!(lines[2], "b.jpg,1,2,3,4,nan,nan,y");

        let headers = split_csv(lines[0]);
        let r = parse_csv_row(&headers, lines[1]).unwrap();
        assert_eq!(r.name, "a.jpg");
        assert_eq!(r.label().as_deref(), Some("x"));
        assert_eq!(r.metadata.get_f64("Eye_X"), Some(1.0));
        assert!(parse_csv_row(&headers, "short,row").is_none());
    }

    #[test]
    fn test_csv_inconsistent_types() {
        let a = Record::new("a").with("K", Point::new(1.0, 2.0));
        let b = Record::new("b").with("K", "text");
        assert!(matches!(render_csv(&[a, b]), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_landmarks() {
        let r = parse_landmarks_line("face.jpg:1,2,3.5,4").unwrap();
        assert_eq!(r.name, "face.jpg");
        assert_eq!(r.points(), vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]);
        assert!(parse_landmarks_line("face.jpg:1,2,3").is_err());
        assert!(parse_landmarks_line("face.jpg 1,2").is_err());
    }

    #[test]
    fn test_fddb() {
        let text = "img/1\n2\n10 20 30 40 0.9\n5 3 0.1 50 60 0.8\nimg/2\n0\n";
        let records = parse_fddb(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.get("Face"), Some(&Value::Rects(vec![Rect::new(10.0, 20.0, 30.0, 40.0)])));
        assert_eq!(records[1].metadata.get("Face"), Some(&Value::Rects(vec![Rect::new(45.0, 55.0, 10.0, 10.0)])));
        assert_eq!(records[1].label().as_deref(), Some("face"));
        assert_eq!(records[1].metadata.get_f64("Confidence"), Some(0.8));

        assert!(parse_fddb("img\n1\n1 2 3\n").is_err());
        assert!(parse_fddb("img\n2\n1 2 3 4 5\n").is_err());
    }

    #[test]
    fn test_arff() {
        let header = arff_header(2);
        assert!(header.contains("@ATTRIBUTE v1 REAL\n"));
        assert!(header.ends_with("@DATA\n"));

        let r = Record::with_label("a", "bob").with_matrix(Matrix::from_f32(&[1.0, 2.5]));
        assert_eq!(arff_row(&r), "1,2.5,'bob'\n");
    }
}
