//! Newline-delimited JSON record codec (`.json`).
//!
//! Each record is one JSON object on its own line. Metadata keys map to
//! object members; the record name is stored under `File`.

use std::io::{BufRead, Write};

use serde_json::{json, Map, Value as Json};
use tracing::warn;

use crate::core::{Metadata, Record, Value};
use crate::util::{Point, Rect, Result};

/// Member holding the record name.
pub const NAME_KEY: &str = "File";

/// Member wrapping binary blobs (hex encoded).
const BLOB_KEY: &str = "blob";

/// Convert a record into a JSON object.
pub fn to_json(record: &Record) -> Json {
    let mut map = Map::new();
    if !record.name.is_empty() {
        map.insert(NAME_KEY.to_string(), Json::String(record.name.clone()));
    }
    for (key, value) in record.metadata.iter() {
        map.insert(key.to_string(), value_to_json(value));
    }
    Json::Object(map)
}

/// Convert a JSON object into a record. Non-object documents yield an
/// empty record.
pub fn from_json(doc: &Json) -> Record {
    let mut record = Record::default();
    let Some(map) = doc.as_object() else {
        return record;
    };
    let mut metadata = Metadata::new();
    for (key, value) in map {
        if key == NAME_KEY {
            if let Some(name) = value.as_str() {
                record.name = name.to_string();
                continue;
            }
        }
        if let Some(v) = json_to_value(value) {
            metadata.set(key.as_str(), v);
        }
    }
    record.metadata = metadata;
    record
}

/// Read one line. `Ok(None)` at end of stream; blank lines give an empty
/// record.
pub fn read_record<R: BufRead + ?Sized>(r: &mut R) -> Result<Option<Record>> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let line = line.trim();
    if line.is_empty() {
        return Ok(Some(Record::default()));
    }
    let doc: Json = serde_json::from_str(line).map_err(|e| {
        warn!("couldn't parse: {}", line);
        e
    })?;
    Ok(Some(from_json(&doc)))
}

/// Write one line. Records with neither name nor metadata are skipped.
pub fn write_record<W: Write + ?Sized>(w: &mut W, record: &Record) -> Result<u64> {
    if record.is_null() && record.metadata.is_empty() {
        return Ok(0);
    }
    let mut line = serde_json::to_vec(&to_json(record))?;
    line.push(b'\n');
    w.write_all(&line)?;
    Ok(line.len() as u64)
}

fn point_json(p: &Point) -> Json {
    json!({ "x": p.x, "y": p.y })
}

fn rect_json(r: &Rect) -> Json {
    json!({ "x": r.x, "y": r.y, "width": r.width, "height": r.height })
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::String(s) => Json::String(s.clone()),
        Value::Point(p) => point_json(p),
        Value::Rect(r) => rect_json(r),
        Value::Points(ps) => Json::Array(ps.iter().map(point_json).collect()),
        Value::Rects(rs) => Json::Array(rs.iter().map(rect_json).collect()),
        Value::Blob(bytes) => json!({ BLOB_KEY: hex::encode(bytes) }),
    }
}

fn json_point(v: &Json) -> Option<Point> {
    let o = v.as_object()?;
    if o.len() != 2 {
        return None;
    }
    Some(Point::new(o.get("x")?.as_f64()?, o.get("y")?.as_f64()?))
}

fn json_rect(v: &Json) -> Option<Rect> {
    let o = v.as_object()?;
    if o.len() != 4 {
        return None;
    }
    Some(Rect::new(
        o.get("x")?.as_f64()?,
        o.get("y")?.as_f64()?,
        o.get("width")?.as_f64()?,
        o.get("height")?.as_f64()?,
    ))
}

fn json_to_value(v: &Json) -> Option<Value> {
    let value = match v {
        Json::Null => return None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64()?),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => {
            if items.is_empty() {
                Value::Points(Vec::new())
            } else if let Some(points) = items.iter().map(json_point).collect::<Option<Vec<_>>>() {
                Value::Points(points)
            } else if let Some(rects) = items.iter().map(json_rect).collect::<Option<Vec<_>>>() {
                Value::Rects(rects)
            } else {
                Value::String(v.to_string())
            }
        }
        Json::Object(o) => {
            if let Some(p) = json_point(v) {
                Value::Point(p)
            } else if let Some(r) = json_rect(v) {
                Value::Rect(r)
            } else if let Some(bytes) = o
                .get(BLOB_KEY)
                .and_then(Json::as_str)
                .filter(|_| o.len() == 1)
                .and_then(|s| hex::decode(s).ok())
            {
                Value::Blob(bytes)
            } else {
                Value::String(v.to_string())
            }
        }
    };
    Some(value)
}
