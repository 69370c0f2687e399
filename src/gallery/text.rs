//! Text galleries: `.txt`, `.flat` and `.csv` stream line by line;
//! `.landmarks` and `.fddb` are parsed whole; `.arff` is write-only.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::mem;

use tracing::{debug, warn};

use super::ListCursor;
use crate::codec::text as codec;
use crate::codec::Tracked;
use crate::core::{Block, Gallery, GalleryDescriptor, Mode, ModeGuard, Record};
use crate::util::{Error, Result};

/// Descriptor option naming the metadata key written after txt file names.
pub const LABEL_OPTION: &str = "label";

fn open_for_read(descriptor: &GalleryDescriptor) -> Result<File> {
    let path = descriptor.path();
    File::open(path).map_err(|e| Error::from_open(path, e))
}

fn open_for_write(descriptor: &GalleryDescriptor) -> Result<File> {
    let parent = descriptor.parent();
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(&parent)?;
    }
    let append = descriptor.get_bool("append");
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(descriptor.path())?)
}

// ============================================================================
// Line streams
// ============================================================================

/// Line layout of a [`TextGallery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineFormat {
    /// `<file>` or `<file> <label>`; writes the metadata value under `label`.
    Txt { label: Option<String> },
    /// `name[key=value,...]`.
    Flat,
    /// Header row plus one row per record; written in one go on close.
    Csv,
}

/// Streaming line-oriented gallery. Progress is the byte offset after the
/// line that produced each record.
pub struct TextGallery {
    descriptor: GalleryDescriptor,
    format: LineFormat,
    block_size: usize,
    mode: ModeGuard,
    input: Option<Tracked<BufReader<File>>>,
    len: u64,
    headers: Vec<String>,
    output: Option<BufWriter<File>>,
    pending: Vec<Record>,
    written: u64,
}

impl TextGallery {
    pub fn new(descriptor: GalleryDescriptor, format: LineFormat) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            format,
            mode: ModeGuard::new(),
            input: None,
            len: 0,
            headers: Vec::new(),
            output: None,
            pending: Vec::new(),
            written: 0,
        })
    }

    fn open_input(&mut self) -> Result<()> {
        let file = open_for_read(&self.descriptor)?;
        self.len = file.metadata()?.len();
        self.input = Some(Tracked::new(BufReader::new(file)));
        self.headers.clear();
        Ok(())
    }

    fn parse(&self, line: &str) -> Result<Option<Record>> {
        Ok(match self.format {
            LineFormat::Txt { .. } => codec::parse_txt_line(line),
            LineFormat::Flat if line.trim().is_empty() => None,
            LineFormat::Flat => Some(Record::parse_flat(line)?),
            LineFormat::Csv => codec::parse_csv_row(&self.headers, line),
        })
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.output.is_none() {
            self.output = Some(BufWriter::new(open_for_write(&self.descriptor)?));
        }
        if let Some(out) = self.output.as_mut() {
            out.write_all(line.as_bytes())?;
            self.written += line.len() as u64;
        }
        Ok(())
    }
}

impl Gallery for TextGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, max: usize) -> Result<Block> {
        self.mode.enter(Mode::Reading, &self.descriptor.name)?;
        let restart = match self.input.as_mut() {
            None => true,
            Some(input) => input.at_end()? && input.pos() > 0,
        };
        if restart {
            if self.input.is_some() {
                debug!("restarting {}", self.descriptor.name);
            }
            self.open_input()?;
        }

        let mut input = match self.input.take() {
            Some(input) => input,
            None => return Ok(Block::finished()),
        };

        let mut line = String::new();
        if self.format == LineFormat::Csv && input.pos() == 0 {
            input.read_line(&mut line)?;
            self.headers = codec::split_csv(&line);
        }

        let mut records = Vec::new();
        let result = (|| -> Result<bool> {
            while records.len() < max && !input.at_end()? {
                line.clear();
                input.read_line(&mut line)?;
                if let Some(mut record) = self.parse(&line)? {
                    record.set_progress(input.pos());
                    records.push(record);
                }
            }
            input.at_end()
        })();
        self.input = Some(input);

        Ok(Block::new(records, result?))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        self.mode.enter(Mode::Writing, &self.descriptor.name)?;
        let line = match &self.format {
            LineFormat::Txt { label } => codec::format_txt_line(record, label.as_deref()),
            LineFormat::Flat => format!("{}\n", record.flat()),
            LineFormat::Csv => {
                self.pending.push(record.clone());
                return Ok(());
            }
        };
        self.write_line(&line)
    }

    fn total_size(&mut self) -> Result<u64> {
        if self.mode.mode() == Some(Mode::Writing) {
            return Ok(self.written);
        }
        if self.input.is_none() {
            self.open_input()?;
        }
        Ok(self.len)
    }

    fn position(&self) -> u64 {
        self.input.as_ref().map_or(self.written, |i| i.pos())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    fn close(&mut self) -> Result<()> {
        let pending = mem::take(&mut self.pending);
        if !pending.is_empty() {
            let table = codec::render_csv(&pending)?;
            self.write_line(&table)?;
        }
        if let Some(out) = self.output.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

impl Drop for TextGallery {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to write {}: {}", self.descriptor.name, e);
        }
    }
}

// ============================================================================
// Whole-file lists
// ============================================================================

/// Layout of a [`ListGallery`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListFormat {
    Landmarks,
    Fddb,
}

/// Read-only gallery parsed in full on first access.
pub struct ListGallery {
    descriptor: GalleryDescriptor,
    format: ListFormat,
    block_size: usize,
    records: Option<Vec<Record>>,
    cursor: ListCursor,
}

impl ListGallery {
    pub fn new(descriptor: GalleryDescriptor, format: ListFormat) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            format,
            records: None,
            cursor: ListCursor::new(),
        })
    }

    fn load(&mut self) -> Result<&[Record]> {
        if self.records.is_none() {
            let mut text = String::new();
            std::io::Read::read_to_string(&mut open_for_read(&self.descriptor)?, &mut text)?;
            let records = match self.format {
                ListFormat::Landmarks => text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(codec::parse_landmarks_line)
                    .collect::<Result<Vec<_>>>()?,
                ListFormat::Fddb => codec::parse_fddb(&text)?,
            };
            debug!("parsed {} records from {}", records.len(), self.descriptor.name);
            self.records = Some(records);
        }
        Ok(self.records.as_deref().unwrap_or_default())
    }
}

impl Gallery for ListGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, max: usize) -> Result<Block> {
        self.load()?;
        let records = self.records.as_deref().unwrap_or_default();
        Ok(self.cursor.take(records, max))
    }

    fn write(&mut self, _record: &Record) -> Result<()> {
        Err(Error::NotSupported(match self.format {
            ListFormat::Landmarks => "writing landmarks galleries",
            ListFormat::Fddb => "writing FDDB galleries",
        }))
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.load()?.len() as u64)
    }

    fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }
}

// ============================================================================
// ARFF
// ============================================================================

/// Write-only Weka ARFF export.
pub struct ArffGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
    output: Option<BufWriter<File>>,
    rows: u64,
}

impl ArffGallery {
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            output: None,
            rows: 0,
        })
    }
}

impl Gallery for ArffGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, _max: usize) -> Result<Block> {
        Err(Error::NotSupported("reading ARFF galleries"))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        if self.output.is_none() {
            let mut out = BufWriter::new(open_for_write(&self.descriptor)?);
            let dimensions = record.matrix.as_ref().map_or(0, |m| m.to_f64_vec().len());
            out.write_all(codec::arff_header(dimensions).as_bytes())?;
            self.output = Some(out);
        }
        if let Some(out) = self.output.as_mut() {
            out.write_all(codec::arff_row(record).as_bytes())?;
            self.rows += 1;
        }
        Ok(())
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.rows)
    }

    fn position(&self) -> u64 {
        self.rows
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    fn close(&mut self) -> Result<()> {
        if let Some(out) = self.output.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

impl Drop for ArffGallery {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to flush {}: {}", self.descriptor.name, e);
        }
    }
}

// ============================================================================
// Factories
// ============================================================================

pub(crate) fn open_txt(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    let label = d.get_string(LABEL_OPTION).filter(|l| !l.is_empty());
    Ok(Box::new(TextGallery::new(d.clone(), LineFormat::Txt { label })?))
}

pub(crate) fn open_flat(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(TextGallery::new(d.clone(), LineFormat::Flat)?))
}

pub(crate) fn open_csv(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(TextGallery::new(d.clone(), LineFormat::Csv)?))
}

pub(crate) fn open_landmarks(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(ListGallery::new(d.clone(), ListFormat::Landmarks)?))
}

pub(crate) fn open_fddb(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(ListGallery::new(d.clone(), ListFormat::Fddb)?))
}

pub(crate) fn open_arff(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(ArffGallery::new(d.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Matrix, Point};

    fn scratch(dir: &tempfile::TempDir, name: &str) -> GalleryDescriptor {
        GalleryDescriptor::new(dir.path().join(name).to_string_lossy().to_string())
    }

    #[test]
    fn test_txt_roundtrip_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let d = scratch(&dir, "list.txt").with("label", "Label");
        {
            let mut g = TextGallery::new(d.clone(), LineFormat::Txt { label: Some("Label".into()) }).unwrap();
            for i in 0..5 {
                g.write(&Record::with_label(format!("a/{}.jpg", i), format!("s{}", i))).unwrap();
            }
        }

        let mut g = TextGallery::new(d, LineFormat::Txt { label: None }).unwrap();
        let total = g.total_size().unwrap();
        let first = g.read_block(2).unwrap();
        assert!(!first.done);
        assert_eq!(first.records[1].label().as_deref(), Some("s1"));
        assert!(!g.read_block(2).unwrap().done);
        let last = g.read_block(2).unwrap();
        assert!(last.done);
        assert_eq!(last.len(), 1);
        assert_eq!(last.records[0].progress(), Some(total as i64));

        // restarts from the top
        assert_eq!(g.read_block(1).unwrap().records[0].name, "a/0.jpg");
    }

    #[test]
    fn test_flat_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let d = scratch(&dir, "r.flat");
        let record = Record::with_label("x.jpg", "bob").with("Eye", Point::new(1.0, 2.0));
        {
            let mut g = TextGallery::new(d.clone(), LineFormat::Flat).unwrap();
            g.write(&record).unwrap();
        }
        let mut g = TextGallery::new(d, LineFormat::Flat).unwrap();
        let back = g.read_all().unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].metadata.get_point("Eye"), Some(Point::new(1.0, 2.0)));
        assert_eq!(back[0].label().as_deref(), Some("bob"));
    }

    #[test]
    fn test_csv_written_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let d = scratch(&dir, "t.csv");
        let mut g = TextGallery::new(d.clone(), LineFormat::Csv).unwrap();
        g.write(&Record::with_label("a.jpg", "x")).unwrap();
        g.write(&Record::with_label("b.jpg", "y")).unwrap();
        assert!(!d.path().exists());
        g.close().unwrap();
        drop(g);

        let text = fs::read_to_string(d.path()).unwrap();
        assert_eq!(text, "File,Label\na.jpg,x\nb.jpg,y\n");

        let mut g = TextGallery::new(d, LineFormat::Csv).unwrap();
        let back = g.read_all().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].label().as_deref(), Some("y"));
    }

    #[test]
    fn test_landmarks_and_fddb() {
        let dir = tempfile::tempdir().unwrap();
        let d = scratch(&dir, "l.landmarks");
        fs::write(d.path(), "a.jpg:1,2,3,4\nb.jpg:5,6\n").unwrap();
        let mut g = ListGallery::new(d, ListFormat::Landmarks).unwrap();
        assert_eq!(g.total_size().unwrap(), 2);
        let all = g.read_all().unwrap();
        assert_eq!(all[0].points().len(), 2);
        assert!(matches!(g.write(&all[0]), Err(Error::NotSupported(_))));

        let d = scratch(&dir, "f.fddb");
        fs::write(d.path(), "img\n1\n1 2 3 4 0.5\n").unwrap();
        let mut g = ListGallery::new(d, ListFormat::Fddb).unwrap();
        assert_eq!(g.read_all().unwrap()[0].label().as_deref(), Some("face"));
    }

    #[test]
    fn test_arff_write_only() {
        let dir = tempfile::tempdir().unwrap();
        let d = scratch(&dir, "o.arff");
        let mut g = ArffGallery::new(d.clone()).unwrap();
        g.write(&Record::with_label("a", "p").with_matrix(Matrix::from_f32(&[1.0, 2.0]))).unwrap();
        g.close().unwrap();
        assert!(matches!(g.read_block(1), Err(Error::NotSupported(_))));
        let text = fs::read_to_string(d.path()).unwrap();
        assert!(text.contains("@ATTRIBUTE v1 REAL"));
        assert!(text.ends_with("1,2,'p'\n"));
    }

    #[test]
    fn test_missing_text_source() {
        let mut g = TextGallery::new(GalleryDescriptor::new("/nonexistent/a.txt"), LineFormat::Flat).unwrap();
        assert!(matches!(g.read_block(1), Err(Error::MissingSource(_))));
    }
}
