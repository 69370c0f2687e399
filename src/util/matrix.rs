//! Binary feature matrices attached to records.

use bytemuck::Pod;
use std::fmt;

use super::{Error, Result};

/// Element depth of a matrix channel.
///
/// Discriminants are the on-disk codes used by the framed codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Depth {
    /// Unsigned 8-bit integer
    #[default]
    U8 = 0,
    /// Signed 8-bit integer
    I8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Signed 16-bit integer
    I16 = 3,
    /// Signed 32-bit integer
    I32 = 4,
    /// 32-bit floating point
    F32 = 5,
    /// 64-bit floating point
    F64 = 6,
}

impl Depth {
    /// Size in bytes of one channel value.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Convert from the on-disk code.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::U8),
            1 => Some(Self::I8),
            2 => Some(Self::U16),
            3 => Some(Self::I16),
            4 => Some(Self::I32),
            5 => Some(Self::F32),
            6 => Some(Self::F64),
            _ => None,
        }
    }

    /// Short type name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dense row-major matrix with interleaved channels.
///
/// The buffer is always owned; decoders copy out of transient read buffers.
#[derive(Clone, Default, PartialEq)]
pub struct Matrix {
    rows: u32,
    cols: u32,
    depth: Depth,
    channels: u8,
    data: Vec<u8>,
}

impl Matrix {
    /// Create a matrix over an existing buffer.
    ///
    /// Fails if the buffer length does not match `rows * cols * elem_size`.
    pub fn new(rows: u32, cols: u32, depth: Depth, channels: u8, data: Vec<u8>) -> Result<Self> {
        if channels == 0 {
            return Err(Error::invalid("matrix must have at least one channel"));
        }
        let expected = rows as u64 * cols as u64 * depth.num_bytes() as u64 * channels as u64;
        if expected != data.len() as u64 {
            return Err(Error::invalid(format!(
                "matrix {}x{}x{} {} expects {} bytes, got {}",
                rows, cols, channels, depth, expected, data.len()
            )));
        }
        Ok(Self { rows, cols, depth, channels, data })
    }

    /// Single-row byte matrix, the shape used for opaque feature vectors.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            rows: 1,
            cols: data.len() as u32,
            depth: Depth::U8,
            channels: 1,
            data,
        }
    }

    /// Single-row `f32` matrix.
    pub fn from_f32(values: &[f32]) -> Self {
        Self {
            rows: 1,
            cols: values.len() as u32,
            depth: Depth::F32,
            channels: 1,
            data: bytemuck::cast_slice(values).to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn depth(&self) -> Depth {
        self.depth
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Bytes per element (all channels).
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.depth.num_bytes() * self.channels as usize
    }

    /// True if the matrix holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the raw byte buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// View the buffer as typed values.
    ///
    /// Returns `None` if the buffer alignment or length does not fit `T`.
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(&self.data).ok()
    }

    /// All elements as `f64`, channel-interleaved.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let n = self.depth.num_bytes();
        self.data
            .chunks_exact(n)
            .map(|c| match self.depth {
                Depth::U8 => c[0] as f64,
                Depth::I8 => c[0] as i8 as f64,
                Depth::U16 => u16::from_le_bytes([c[0], c[1]]) as f64,
                Depth::I16 => i16::from_le_bytes([c[0], c[1]]) as f64,
                Depth::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                Depth::F32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                Depth::F64 => f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]),
            })
            .collect()
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Matrix({}x{}x{} {}, {} bytes)",
            self.rows,
            self.cols,
            self.channels,
            self.depth,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_length() {
        assert!(Matrix::new(2, 3, Depth::U8, 3, vec![0; 18]).is_ok());
        assert!(Matrix::new(2, 3, Depth::U8, 3, vec![0; 17]).is_err());
        assert!(Matrix::new(1, 1, Depth::U8, 0, vec![]).is_err());
    }

    #[test]
    fn test_elem_size() {
        let m = Matrix::new(1, 2, Depth::F32, 2, vec![0; 16]).unwrap();
        assert_eq!(m.elem_size(), 8);
        assert_eq!(Depth::F64.num_bytes(), 8);
    }

    #[test]
    fn test_f32_values() {
        let m = Matrix::from_f32(&[1.5, -2.0]);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.data().len(), 8);
        assert_eq!(m.to_f64_vec(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_depth_codes() {
        for code in 0..7u8 {
            let d = Depth::from_u8(code).unwrap();
            assert_eq!(d as u8, code);
        }
        assert_eq!(Depth::from_u8(7), None);
    }
}
