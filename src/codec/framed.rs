//! Binary framed record codec (`.gal`).
//!
//! A literal dump of the in-memory record, one frame per record, all
//! integers little-endian:
//!
//! ```text
//! +-----------------------------+
//! | name length N       u32     |
//! | name                N bytes |
//! | entry count E       u32     |
//! | E x entry                   |
//! |   key length K      u32     |
//! |   key               K bytes |
//! |   value tag         u8      |
//! |   value payload     (tag)   |
//! | matrix count M      u32     |  0 or 1
//! | M x matrix                  |
//! |   rows, cols        u32 u32 |
//! |   depth, channels   u8 u8   |
//! |   data    rows*cols*elem    |
//! +-----------------------------+
//! ```
//!
//! Failure-to-enroll records are written with `M = 0`, so they are strictly
//! smaller on disk than the same record with its payload.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::stream::{read_exact_or_eof, read_vec};
use crate::core::{Metadata, Record, Value};
use crate::util::{Depth, Error, Matrix, Point, Rect, Result};

/// Value tags.
const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_POINT: u8 = 4;
const TAG_RECT: u8 = 5;
const TAG_POINTS: u8 = 6;
const TAG_RECTS: u8 = 7;
const TAG_BLOB: u8 = 8;

/// Upper bound on pre-reserved list capacity.
const RESERVE_LIMIT: usize = 64;

/// Encode one record. Returns the number of bytes written.
///
/// Null records without payload are skipped (0 bytes). Records flagged as
/// failure-to-enroll are written without their matrix.
pub fn write_record<W: Write + ?Sized>(w: &mut W, record: &Record) -> Result<u64> {
    if record.is_empty() && record.is_null() {
        return Ok(0);
    }

    let mut buf = Vec::with_capacity(64 + record.bytes());
    write_string(&mut buf, &record.name)?;

    buf.write_u32::<LittleEndian>(record.metadata.len() as u32)?;
    for (key, value) in record.metadata.iter() {
        write_string(&mut buf, key)?;
        write_value(&mut buf, value)?;
    }

    match record.matrix.as_ref().filter(|_| !record.is_fte()) {
        Some(m) => {
            buf.write_u32::<LittleEndian>(1)?;
            buf.write_u32::<LittleEndian>(m.rows())?;
            buf.write_u32::<LittleEndian>(m.cols())?;
            buf.write_u8(m.depth() as u8)?;
            buf.write_u8(m.channels())?;
            buf.extend_from_slice(m.data());
        }
        None => buf.write_u32::<LittleEndian>(0)?,
    }

    w.write_all(&buf)?;
    Ok(buf.len() as u64)
}

/// Decode one record.
///
/// Returns `Ok(None)` at a clean end of stream; a stream ending inside a
/// frame is [`Error::Truncated`].
pub fn read_record<R: Read + ?Sized>(r: &mut R) -> Result<Option<Record>> {
    let mut len = [0u8; 4];
    if !read_exact_or_eof(r, &mut len)? {
        return Ok(None);
    }
    let name = read_string_body(r, LittleEndian::read_u32(&len))?;

    let count = read_u32(r)?;
    let mut metadata = Metadata::new();
    for _ in 0..count {
        let key = read_string(r)?;
        let value = read_value(r)?;
        metadata.set(key, value);
    }

    let matrix = match read_u32(r)? {
        0 => None,
        1 => Some(read_matrix(r)?),
        n => return Err(Error::invalid(format!("frame declares {} matrices", n))),
    };

    Ok(Some(Record { name, metadata, matrix }))
}

fn read_matrix<R: Read + ?Sized>(r: &mut R) -> Result<Matrix> {
    let rows = read_u32(r)?;
    let cols = read_u32(r)?;
    let depth_code = read_u8(r)?;
    let depth = Depth::from_u8(depth_code)
        .ok_or_else(|| Error::invalid(format!("unknown matrix depth {}", depth_code)))?;
    let channels = read_u8(r)?;

    let len = rows as u64 * cols as u64 * depth.num_bytes() as u64 * channels as u64;
    let data = read_vec(r, len)?;
    Matrix::new(rows, cols, depth, channels, data)
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u32::<LittleEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Bool(b) => {
            buf.write_u8(TAG_BOOL)?;
            buf.write_u8(*b as u8)?;
        }
        Value::Int(v) => {
            buf.write_u8(TAG_INT)?;
            buf.write_i64::<LittleEndian>(*v)?;
        }
        Value::Float(v) => {
            buf.write_u8(TAG_FLOAT)?;
            buf.write_f64::<LittleEndian>(*v)?;
        }
        Value::String(s) => {
            buf.write_u8(TAG_STRING)?;
            write_string(buf, s)?;
        }
        Value::Point(p) => {
            buf.write_u8(TAG_POINT)?;
            write_point(buf, p)?;
        }
        Value::Rect(r) => {
            buf.write_u8(TAG_RECT)?;
            write_rect(buf, r)?;
        }
        Value::Points(points) => {
            buf.write_u8(TAG_POINTS)?;
            buf.write_u32::<LittleEndian>(points.len() as u32)?;
            for p in points {
                write_point(buf, p)?;
            }
        }
        Value::Rects(rects) => {
            buf.write_u8(TAG_RECTS)?;
            buf.write_u32::<LittleEndian>(rects.len() as u32)?;
            for r in rects {
                write_rect(buf, r)?;
            }
        }
        Value::Blob(bytes) => {
            buf.write_u8(TAG_BLOB)?;
            buf.write_u32::<LittleEndian>(bytes.len() as u32)?;
            buf.extend_from_slice(bytes);
        }
    }
    Ok(())
}

fn write_point(buf: &mut Vec<u8>, p: &Point) -> Result<()> {
    buf.write_f64::<LittleEndian>(p.x)?;
    buf.write_f64::<LittleEndian>(p.y)?;
    Ok(())
}

fn write_rect(buf: &mut Vec<u8>, r: &Rect) -> Result<()> {
    buf.write_f64::<LittleEndian>(r.x)?;
    buf.write_f64::<LittleEndian>(r.y)?;
    buf.write_f64::<LittleEndian>(r.width)?;
    buf.write_f64::<LittleEndian>(r.height)?;
    Ok(())
}

fn read_value<R: Read + ?Sized>(r: &mut R) -> Result<Value> {
    let tag = read_u8(r)?;
    let value = match tag {
        TAG_BOOL => Value::Bool(read_u8(r)? != 0),
        TAG_INT => Value::Int(read_fixed::<_, 8>(r).map(|b| LittleEndian::read_i64(&b))?),
        TAG_FLOAT => Value::Float(read_f64(r)?),
        TAG_STRING => Value::String(read_string(r)?),
        TAG_POINT => Value::Point(read_point(r)?),
        TAG_RECT => Value::Rect(read_rect(r)?),
        TAG_POINTS => {
            let n = read_u32(r)? as usize;
            let mut points = Vec::with_capacity(n.min(RESERVE_LIMIT));
            for _ in 0..n {
                points.push(read_point(r)?);
            }
            Value::Points(points)
        }
        TAG_RECTS => {
            let n = read_u32(r)? as usize;
            let mut rects = Vec::with_capacity(n.min(RESERVE_LIMIT));
            for _ in 0..n {
                rects.push(read_rect(r)?);
            }
            Value::Rects(rects)
        }
        TAG_BLOB => {
            let n = read_u32(r)?;
            Value::Blob(read_vec(r, n as u64)?)
        }
        other => return Err(Error::invalid(format!("unknown value tag {}", other))),
    };
    Ok(value)
}

fn read_point<R: Read + ?Sized>(r: &mut R) -> Result<Point> {
    Ok(Point::new(read_f64(r)?, read_f64(r)?))
}

fn read_rect<R: Read + ?Sized>(r: &mut R) -> Result<Rect> {
    Ok(Rect::new(read_f64(r)?, read_f64(r)?, read_f64(r)?, read_f64(r)?))
}

fn read_string<R: Read + ?Sized>(r: &mut R) -> Result<String> {
    let len = read_u32(r)?;
    read_string_body(r, len)
}

fn read_string_body<R: Read + ?Sized>(r: &mut R, len: u32) -> Result<String> {
    Ok(String::from_utf8(read_vec(r, len as u64)?)?)
}

/// Fixed-size read inside a frame; a short read is truncation.
fn read_fixed<R: Read + ?Sized, const N: usize>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    super::stream::read_exact(r, &mut buf)?;
    Ok(buf)
}

fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8> {
    Ok(read_fixed::<_, 1>(r)?[0])
}

fn read_u32<R: Read + ?Sized>(r: &mut R) -> Result<u32> {
    read_fixed::<_, 4>(r).map(|b| LittleEndian::read_u32(&b))
}

fn read_f64<R: Read + ?Sized>(r: &mut R) -> Result<f64> {
    read_fixed::<_, 8>(r).map(|b| LittleEndian::read_f64(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Record {
        let mut r = Record::with_label("faces/alice/01.jpg", "alice")
            .with("Confidence", 0.75)
            .with("Blob", vec![1u8, 2, 3])
            .with_matrix(Matrix::from_f32(&[0.5, 1.5, -2.0]));
        r.set_rects(vec![Rect::new(1.0, 2.0, 3.0, 4.0)]);
        r.set_points(vec![Point::new(5.0, 6.0), Point::new(7.0, 8.0)]);
        r
    }

    #[test]
    fn test_roundtrip() {
        let record = sample();
        let mut buf = Vec::new();
        let n = write_record(&mut buf, &record).unwrap();
        assert_eq!(n as usize, buf.len());

        let mut r = Cursor::new(buf);
        assert_eq!(read_record(&mut r).unwrap(), Some(record));
        assert_eq!(read_record(&mut r).unwrap(), None);
    }

    #[test]
    fn test_fte_drops_matrix() {
        let full = sample();
        let mut failed = full.clone();
        failed.set_fte(true);
        let mut failed_payload = full.clone();
        failed_payload.set_fte(false);

        let mut a = Vec::new();
        write_record(&mut a, &failed_payload).unwrap();
        let mut b = Vec::new();
        write_record(&mut b, &failed).unwrap();
        assert!(b.len() < a.len());

        let back = read_record(&mut Cursor::new(b)).unwrap().unwrap();
        assert!(back.is_fte());
        assert!(back.matrix.is_none());
        assert_eq!(back.label().as_deref(), Some("alice"));
    }

    #[test]
    fn test_null_record_skipped() {
        let mut buf = Vec::new();
        assert_eq!(write_record(&mut buf, &Record::default()).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_mid_frame() {
        let mut buf = Vec::new();
        write_record(&mut buf, &sample()).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            read_record(&mut Cursor::new(buf)),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_truncated_inside_field() {
        let mut buf = Vec::new();
        write_string(&mut buf, "x").unwrap();
        buf.extend([1, 0]);
        assert!(matches!(
            read_record(&mut Cursor::new(buf)),
            Err(Error::Truncated { needed: 4, got: 2 })
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let mut buf = Vec::new();
        write_string(&mut buf, "x").unwrap();
        buf.write_u32::<LittleEndian>(1).unwrap();
        write_string(&mut buf, "k").unwrap();
        buf.push(99);
        assert!(matches!(
            read_record(&mut Cursor::new(buf)),
            Err(Error::InvalidRecord(_))
        ));
    }
}
