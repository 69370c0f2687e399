//! Norpix sequence container codec (`.seq`).
//!
//! ## File Structure
//!
//! ```text
//! +---------------------------+ 0
//! | magic 0xED 0xFE + 2 bytes |
//! +---------------------------+ 4
//! | name, 12 x UTF-16LE       |  "Norpix seq"
//! +---------------------------+ 28
//! | version              i32  |
//! | header size          i32  |  always 1024
//! +---------------------------+ 36
//! | description, 256 x UTF-16 |
//! +---------------------------+ 548
//! | width                u32  |
//! | height               u32  |
//! | bit depth            u32  |  channels = bit depth / 8
//! | real bit depth       u32  |  must be 8
//! | image size bytes     u32  |
//! | image format         u32  |
//! | frame count          u32  |
//! | reserved             u32  |
//! | true image size      u32  |  raw frame stride
//! +---------------------------+ 584
//! | ... padding ...           |
//! +---------------------------+ 1024
//! | frames                    |
//! +---------------------------+
//! ```
//!
//! Compressed frames start with a `u32` length that includes itself and are
//! followed by trailing bytes (8, or 16 in some writers).

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use super::stream::{read_exact, read_vec};
use crate::core::FrameDecoder;
use crate::util::{Depth, Error, Matrix, Result};

/// Magic bytes at the start of a sequence file.
pub const SEQ_MAGIC: [u8; 2] = [0xED, 0xFE];

/// Format name stored after the magic.
pub const SEQ_NAME: &str = "Norpix seq";

/// Size of the file header; frame data starts here.
pub const HEADER_SIZE: u32 = 1024;

/// Bytes of UTF-16 name text after the magic.
pub const NAME_BYTES: usize = 24;

/// Bytes of UTF-16 description text.
pub const DESCRIPTION_BYTES: usize = 512;

/// Trailing bytes after a compressed frame, before padding detection.
pub const COMPRESSED_PADDING: u64 = 8;

/// Offset of the width field.
pub const IMAGE_INFO_OFFSET: usize = 36 + DESCRIPTION_BYTES;

/// Physical layout of the frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameLayout {
    /// Fixed-size uncompressed frames.
    Raw,
    /// Length-prefixed encoded images.
    Compressed,
}

impl FrameLayout {
    /// Classify an image format code.
    pub fn classify(code: i32) -> Result<Self> {
        match code {
            100 | 200 | 101 => Ok(Self::Raw),
            102 | 201 | 103 | 1 | 2 => Ok(Self::Compressed),
            other => Err(Error::UnsupportedFormat(other)),
        }
    }
}

/// Parsed sequence header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqHeader {
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub image_size: u32,
    pub format_code: i32,
    pub layout: FrameLayout,
    pub frame_count: u32,
    pub true_image_size: u32,
}

impl SeqHeader {
    /// Pixel bytes of one raw frame.
    pub fn raw_pixel_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.channels as u64
    }

    /// Encode as a full 1024-byte header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(&SEQ_MAGIC);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&widen_text(SEQ_NAME, NAME_BYTES));
        buf.write_i32::<LittleEndian>(3)?;
        buf.write_u32::<LittleEndian>(HEADER_SIZE)?;
        buf.extend_from_slice(&widen_text(&self.description, DESCRIPTION_BYTES));
        buf.write_u32::<LittleEndian>(self.width)?;
        buf.write_u32::<LittleEndian>(self.height)?;
        buf.write_u32::<LittleEndian>(self.channels * 8)?;
        buf.write_u32::<LittleEndian>(8)?;
        buf.write_u32::<LittleEndian>(self.image_size)?;
        buf.write_i32::<LittleEndian>(self.format_code)?;
        buf.write_u32::<LittleEndian>(self.frame_count)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.true_image_size)?;
        buf.resize(HEADER_SIZE as usize, 0);
        Ok(buf)
    }
}

/// Validate and parse the header. The reader is left at an unspecified
/// position.
pub fn read_header<R: Read + Seek>(r: &mut R) -> Result<SeqHeader> {
    let file_len = r.seek(SeekFrom::End(0))?;
    if file_len < HEADER_SIZE as u64 {
        return Err(Error::malformed("no header in seq file"));
    }
    r.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 4];
    read_exact(r, &mut magic)?;
    if magic[..2] != SEQ_MAGIC {
        return Err(Error::malformed(format!(
            "bad magic {:02X} {:02X}",
            magic[0], magic[1]
        )));
    }

    let mut name = [0u8; NAME_BYTES];
    read_exact(r, &mut name)?;
    if !narrow_text(&name).starts_with(SEQ_NAME) {
        return Err(Error::malformed("missing 'Norpix seq' signature"));
    }

    // version
    r.seek(SeekFrom::Current(4))?;
    let header_size = r.read_u32::<LittleEndian>()?;
    if header_size != HEADER_SIZE {
        return Err(Error::malformed(format!(
            "header size {} (expected {})",
            header_size, HEADER_SIZE
        )));
    }

    let mut desc = vec![0u8; DESCRIPTION_BYTES];
    read_exact(r, &mut desc)?;
    let description = narrow_text(&desc);

    let width = r.read_u32::<LittleEndian>()?;
    let height = r.read_u32::<LittleEndian>()?;
    let channels = r.read_u32::<LittleEndian>()? / 8;
    let real_bit_depth = r.read_u32::<LittleEndian>()?;
    if real_bit_depth != 8 {
        return Err(Error::malformed(format!("bit depth {} (expected 8)", real_bit_depth)));
    }
    let image_size = r.read_u32::<LittleEndian>()?;
    let format_code = r.read_i32::<LittleEndian>()?;
    let layout = FrameLayout::classify(format_code)?;
    let frame_count = r.read_u32::<LittleEndian>()?;
    // reserved
    r.seek(SeekFrom::Current(4))?;
    let true_image_size = r.read_u32::<LittleEndian>()?;

    let header = SeqHeader {
        description,
        width,
        height,
        channels,
        image_size,
        format_code,
        layout,
        frame_count,
        true_image_size,
    };

    if layout == FrameLayout::Raw {
        if channels != 1 && channels != 3 {
            return Err(Error::malformed(format!("raw frames with {} channels", channels)));
        }
        if (image_size as u64) < header.raw_pixel_bytes() {
            return Err(Error::malformed(format!(
                "image size {} too small for {}x{}x{}",
                image_size, width, height, channels
            )));
        }
        check_raw_stride(&header)?;
    }

    debug!(
        "seq header: {}x{}x{} {:?} (code {}), {} frames",
        width, height, channels, layout, format_code, frame_count
    );
    Ok(header)
}

/// More than one raw frame needs a stride covering a whole frame.
fn check_raw_stride(header: &SeqHeader) -> Result<()> {
    if header.frame_count > 1
        && (header.true_image_size == 0 || header.true_image_size < header.image_size)
    {
        return Err(Error::malformed(format!(
            "raw stride {} for {}-byte frames",
            header.true_image_size, header.image_size
        )));
    }
    Ok(())
}

/// Offsets of fixed-stride raw frames.
pub fn raw_frame_offsets(header_size: u32, frame_count: u32, stride: u32) -> Vec<u64> {
    (0..frame_count as u64)
        .map(|i| header_size as u64 + i * stride as u64)
        .collect()
}

/// Build the frame offset table.
///
/// Compressed offsets are chained through each frame's length prefix. On
/// the first step the byte at the computed offset is probed: zero means the
/// writer used 16 trailing bytes instead of 8, for every frame.
pub fn frame_offsets<R: Read + Seek>(r: &mut R, header: &SeqHeader) -> Result<Vec<u64>> {
    let file_len = r.seek(SeekFrom::End(0))?;

    let offsets = match header.layout {
        FrameLayout::Raw => {
            check_raw_stride(header)?;
            if header.frame_count > 0 {
                let last_end = HEADER_SIZE as u64
                    + (header.frame_count as u64 - 1) * header.true_image_size as u64
                    + header.image_size as u64;
                if last_end > file_len {
                    return Err(Error::Truncated {
                        needed: last_end,
                        got: file_len,
                    });
                }
            }
            raw_frame_offsets(HEADER_SIZE, header.frame_count, header.true_image_size)
        }
        FrameLayout::Compressed => {
            let mut offsets = Vec::with_capacity((header.frame_count as usize).min(4096));
            if header.frame_count > 0 {
                offsets.push(HEADER_SIZE as u64);
            }
            let mut extra = COMPRESSED_PADDING;
            for i in 1..header.frame_count {
                let last = offsets[i as usize - 1];
                r.seek(SeekFrom::Start(last))?;
                let size = read_frame_size(r, last)?;
                let mut next = last + size as u64 + extra;

                if i == 1 {
                    r.seek(SeekFrom::Start(next))?;
                    let mut probe = [0u8; 1];
                    read_exact(r, &mut probe)?;
                    if probe[0] == 0 {
                        debug!("seq frames use 16 trailing bytes");
                        next += COMPRESSED_PADDING;
                        extra += COMPRESSED_PADDING;
                    }
                }
                if next >= file_len {
                    return Err(Error::Truncated {
                        needed: next + 1,
                        got: file_len,
                    });
                }
                offsets.push(next);
            }
            offsets
        }
    };
    Ok(offsets)
}

/// Read and decode the frame at `offset`.
///
/// The returned matrix owns its pixels.
pub fn read_frame<R: Read + Seek>(
    r: &mut R,
    header: &SeqHeader,
    offset: u64,
    decoder: &dyn FrameDecoder,
) -> Result<Matrix> {
    r.seek(SeekFrom::Start(offset))?;
    match header.layout {
        FrameLayout::Compressed => {
            let size = read_frame_size(r, offset)?;
            let bytes = read_vec(r, size as u64 - 4)?;
            decoder.decode(&bytes)
        }
        FrameLayout::Raw => {
            let mut pixels = read_vec(r, header.image_size as u64)?;
            pixels.truncate(header.raw_pixel_bytes() as usize);
            Matrix::new(
                header.height,
                header.width,
                Depth::U8,
                header.channels as u8,
                pixels,
            )
        }
    }
}

/// Length prefix of a compressed frame (includes the 4 prefix bytes).
fn read_frame_size<R: Read>(r: &mut R, offset: u64) -> Result<u32> {
    let mut raw = [0u8; 4];
    read_exact(r, &mut raw)?;
    let size = LittleEndian::read_u32(&raw);
    if size < 4 {
        return Err(Error::malformed(format!(
            "frame at {} declares {} bytes",
            offset, size
        )));
    }
    Ok(size)
}

/// Keep the low byte of each 16-bit code unit, up to the first NUL.
pub fn narrow_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .step_by(2)
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Inverse of [`narrow_text`], NUL padded to `len` bytes.
fn widen_text(text: &str, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for b in text.bytes().take(len / 2) {
        out.push(b);
        out.push(0);
    }
    out.resize(len, 0);
    out
}

/// Append a compressed frame as written by the acquisition software.
pub fn write_compressed_frame<W: Write>(w: &mut W, bytes: &[u8], padding: usize) -> Result<()> {
    w.write_u32::<LittleEndian>(bytes.len() as u32 + 4)?;
    w.write_all(bytes)?;
    w.write_all(&vec![0u8; padding])?;
    Ok(())
}
