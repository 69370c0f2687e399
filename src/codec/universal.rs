//! Universal template codec (`.ut`).
//!
//! A contiguous array of fixed-header records, little-endian:
//!
//! ```text
//! +--------------------+
//! | image id  16 bytes |
//! | algorithm id   i32 |
//! | x              u32 |
//! | y              u32 |
//! | width          u32 |
//! | height         u32 |
//! | label          u32 |
//! | url size       u32 |  includes the NUL terminator
//! | fv size        u32 |
//! +--------------------+  48 bytes
//! | url   url size     |
//! | fv    fv size      |
//! +--------------------+
//! ```
//!
//! For the face algorithm ids (-1, -2, -3) the header box is the frontal face
//! and the first 16 bytes of the feature section hold two eye landmarks as
//! four `u32` (first eye x, y; second eye x, y). Algorithm id 0 marks a
//! failed enrollment and carries no feature bytes.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::stream::{read_exact_or_eof, read_vec};
use crate::core::{Record, LABEL_KEY};
use crate::util::{Error, Matrix, Point, Rect, Result};

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 48;

/// Size of the eye landmark block for face algorithm ids.
pub const EYE_BLOCK_SIZE: usize = 16;

/// Algorithm id marking a failed enrollment.
pub const FAILED_ALGORITHM_ID: i32 = 0;

// Metadata keys
pub const IMAGE_ID_KEY: &str = "ImageID";
pub const ALGORITHM_ID_KEY: &str = "AlgorithmID";
pub const URL_KEY: &str = "URL";
pub const FRONTAL_FACE_KEY: &str = "FrontalFace";
pub const FIRST_EYE_KEY: &str = "First_Eye";
pub const SECOND_EYE_KEY: &str = "Second_Eye";
pub const X_KEY: &str = "X";
pub const Y_KEY: &str = "Y";
pub const WIDTH_KEY: &str = "Width";
pub const HEIGHT_KEY: &str = "Height";

/// True for the algorithm ids whose header box is a face with eye landmarks.
#[inline]
pub const fn is_face_algorithm(algorithm_id: i32) -> bool {
    algorithm_id <= -1 && algorithm_id >= -3
}

/// Fixed-size record header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniversalHeader {
    pub image_id: [u8; 16],
    pub algorithm_id: i32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub label: u32,
    pub url_size: u32,
    pub fv_size: u32,
}

impl UniversalHeader {
    /// Parse from exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(b: &[u8; HEADER_SIZE]) -> Self {
        let u32_at = |o: usize| LittleEndian::read_u32(&b[o..o + 4]);
        let mut image_id = [0u8; 16];
        image_id.copy_from_slice(&b[..16]);
        Self {
            image_id,
            algorithm_id: u32_at(16) as i32,
            x: u32_at(20),
            y: u32_at(24),
            width: u32_at(28),
            height: u32_at(32),
            label: u32_at(36),
            url_size: u32_at(40),
            fv_size: u32_at(44),
        }
    }

    /// Serialize to the on-disk layout.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.image_id)?;
        w.write_i32::<LittleEndian>(self.algorithm_id)?;
        w.write_u32::<LittleEndian>(self.x)?;
        w.write_u32::<LittleEndian>(self.y)?;
        w.write_u32::<LittleEndian>(self.width)?;
        w.write_u32::<LittleEndian>(self.height)?;
        w.write_u32::<LittleEndian>(self.label)?;
        w.write_u32::<LittleEndian>(self.url_size)?;
        w.write_u32::<LittleEndian>(self.fv_size)?;
        Ok(())
    }
}

/// Decode one universal template.
///
/// Returns `Ok(None)` at a clean end of stream; a stream that ends inside
/// the header or payload is [`Error::Truncated`].
pub fn read_record<R: Read + ?Sized>(r: &mut R) -> Result<Option<Record>> {
    let mut raw = [0u8; HEADER_SIZE];
    if !read_exact_or_eof(r, &mut raw)? {
        return Ok(None);
    }
    let header = UniversalHeader::from_bytes(&raw);

    let url_size = header.url_size as usize;
    let data = read_vec(r, header.url_size as u64 + header.fv_size as u64)?;
    let (url_bytes, mut fv) = data.split_at(url_size);

    let url_end = url_bytes.iter().position(|&b| b == 0).unwrap_or(url_bytes.len());
    let url = String::from_utf8_lossy(&url_bytes[..url_end]).into_owned();

    let mut record = Record::default();
    record.metadata.set(IMAGE_ID_KEY, hex::encode(header.image_id));
    record.metadata.set(ALGORITHM_ID_KEY, header.algorithm_id);
    record.metadata.set(URL_KEY, url);

    if is_face_algorithm(header.algorithm_id) {
        if fv.len() < EYE_BLOCK_SIZE {
            return Err(Error::malformed(format!(
                "algorithm {} needs a {}-byte eye block, feature section has {}",
                header.algorithm_id,
                EYE_BLOCK_SIZE,
                fv.len()
            )));
        }
        let u32_at = |o: usize| LittleEndian::read_u32(&fv[o..o + 4]) as f64;
        let first = Point::new(u32_at(0), u32_at(4));
        let second = Point::new(u32_at(8), u32_at(12));
        fv = &fv[EYE_BLOCK_SIZE..];

        record.metadata.set(
            FRONTAL_FACE_KEY,
            Rect::new(header.x as f64, header.y as f64, header.width as f64, header.height as f64),
        );
        record.metadata.set(FIRST_EYE_KEY, first);
        record.metadata.set(SECOND_EYE_KEY, second);
    } else {
        record.metadata.set(X_KEY, header.x);
        record.metadata.set(Y_KEY, header.y);
        record.metadata.set(WIDTH_KEY, header.width);
        record.metadata.set(HEIGHT_KEY, header.height);
    }
    record.metadata.set(LABEL_KEY, header.label);
    record.matrix = Some(Matrix::from_bytes(fv.to_vec()));

    Ok(Some(record))
}

/// Encode one record as a universal template. Returns bytes written.
pub fn write_record<W: Write + ?Sized>(w: &mut W, record: &Record) -> Result<u64> {
    let md = &record.metadata;

    let image_id = match md.get_string(IMAGE_ID_KEY) {
        Some(text) => hex::decode(text.trim())?,
        None => vec![0u8; 16],
    };
    let image_id: [u8; 16] = image_id
        .as_slice()
        .try_into()
        .map_err(|_| Error::invalid(format!("expected 16-byte ImageID, got {} bytes", image_id.len())))?;

    let algorithm_id = if record.is_empty() || record.is_fte() {
        FAILED_ALGORITHM_ID
    } else {
        let id = md
            .get_i64(ALGORITHM_ID_KEY)
            .ok_or_else(|| Error::MissingField(ALGORITHM_ID_KEY.into()))?;
        i32::try_from(id).map_err(|_| Error::invalid(format!("AlgorithmID {} out of range", id)))?
    };

    let url = md.get_string(URL_KEY).unwrap_or_else(|| record.name.clone());
    let mut url_bytes = latin1(&url);
    url_bytes.push(0);

    let mut eyes: Vec<u8> = Vec::new();
    let (x, y, width, height) = if is_face_algorithm(algorithm_id) {
        let face = md
            .get_rect(FRONTAL_FACE_KEY)
            .ok_or_else(|| Error::MissingField(FRONTAL_FACE_KEY.into()))?;
        let first = md
            .get_point(FIRST_EYE_KEY)
            .ok_or_else(|| Error::MissingField(FIRST_EYE_KEY.into()))?;
        let second = md
            .get_point(SECOND_EYE_KEY)
            .ok_or_else(|| Error::MissingField(SECOND_EYE_KEY.into()))?;
        for v in [first.x, first.y, second.x, second.y] {
            eyes.write_u32::<LittleEndian>(v as u32)?;
        }
        (face.x as u32, face.y as u32, face.width as u32, face.height as u32)
    } else {
        let field = |key: &str| md.get_i64(key).unwrap_or(0) as u32;
        (field(X_KEY), field(Y_KEY), field(WIDTH_KEY), field(HEIGHT_KEY))
    };
    let label = md.get_i64(LABEL_KEY).unwrap_or(0) as u32;

    let signature: &[u8] = match (&record.matrix, algorithm_id) {
        (_, FAILED_ALGORITHM_ID) | (None, _) => &[],
        (Some(m), _) => m.data(),
    };
    let fv_size = if algorithm_id == FAILED_ALGORITHM_ID {
        0
    } else {
        eyes.len() + signature.len()
    };

    let header = UniversalHeader {
        image_id,
        algorithm_id,
        x,
        y,
        width,
        height,
        label,
        url_size: url_bytes.len() as u32,
        fv_size: fv_size as u32,
    };
    header.write_to(w)?;
    w.write_all(&url_bytes)?;
    if algorithm_id != FAILED_ALGORITHM_ID {
        w.write_all(&eyes)?;
        w.write_all(signature)?;
    }

    Ok((HEADER_SIZE + url_bytes.len() + fv_size) as u64)
}

/// Latin-1 encoding; characters outside the range become '?'.
fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 256 { c as u32 as u8 } else { b'?' })
        .collect()
}
