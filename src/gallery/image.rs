//! Default collaborators backed by the `image` crate.

use std::path::Path;

use image::{ColorType, DynamicImage};

use crate::core::{AnnotationSource, FrameDecoder, Gallery, ImageWriter};
use crate::util::{Depth, Error, Matrix, Rect, Result};

/// Decodes compressed frames (JPEG, PNG, ...) into 8-bit matrices.
///
/// Grayscale images give one channel, everything else is converted to
/// interleaved RGB.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFrameDecoder;

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Matrix> {
        let img = image::load_from_memory(bytes)?;
        image_to_matrix(img)
    }
}

/// Convert a decoded image into an owned 8-bit matrix.
pub fn image_to_matrix(img: DynamicImage) -> Result<Matrix> {
    let (width, height) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(gray) => {
            Matrix::new(height, width, Depth::U8, 1, gray.into_raw())
        }
        other => Matrix::new(height, width, Depth::U8, 3, other.to_rgb8().into_raw()),
    }
}

/// Writes 8-bit matrices with 1, 3 or 4 channels as image files; the format
/// follows the destination extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileWriter;

impl ImageWriter for ImageFileWriter {
    fn write(&self, matrix: &Matrix, destination: &Path) -> Result<()> {
        if matrix.depth() != Depth::U8 {
            return Err(Error::invalid(format!(
                "cannot write {} matrix as an image",
                matrix.depth()
            )));
        }
        let color = match matrix.channels() {
            1 => ColorType::L8,
            3 => ColorType::Rgb8,
            4 => ColorType::Rgba8,
            n => {
                return Err(Error::invalid(format!(
                    "cannot write {} channel matrix as an image",
                    n
                )))
            }
        };
        image::save_buffer(destination, matrix.data(), matrix.cols(), matrix.rows(), color)?;
        Ok(())
    }
}

/// Per-frame regions taken from the `Rects` of another gallery's records,
/// in record order.
#[derive(Clone, Debug, Default)]
pub struct GalleryAnnotations {
    frames: Vec<Vec<Rect>>,
    cursor: usize,
}

impl GalleryAnnotations {
    pub fn new(frames: Vec<Vec<Rect>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Read every record of `gallery` once.
    pub fn from_gallery(gallery: &mut dyn Gallery) -> Result<Self> {
        let frames = gallery.read_all()?.iter().map(|r| r.rects()).collect();
        Ok(Self::new(frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl AnnotationSource for GalleryAnnotations {
    fn next_regions(&mut self) -> Option<Vec<Rect>> {
        let regions = self.frames.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(regions)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_gray_and_color() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_raw(2, 1, vec![10, 20]).unwrap());
        let m = ImageFrameDecoder.decode(&png_bytes(gray)).unwrap();
        assert_eq!((m.rows(), m.cols(), m.channels()), (1, 2, 1));
        assert_eq!(m.data(), &[10, 20]);

        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_raw(1, 2, vec![1, 2, 3, 4, 5, 6]).unwrap());
        let m = ImageFrameDecoder.decode(&png_bytes(rgb)).unwrap();
        assert_eq!((m.rows(), m.cols(), m.channels()), (2, 1, 3));
        assert_eq!(m.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(ImageFrameDecoder.decode(b"nope"), Err(Error::Image(_))));
    }

    #[test]
    fn test_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let m = Matrix::new(2, 2, Depth::U8, 1, vec![0, 64, 128, 255]).unwrap();
        ImageFileWriter.write(&m, &path).unwrap();

        let back = image_to_matrix(image::open(&path).unwrap()).unwrap();
        assert_eq!(back, m);

        let f = Matrix::from_f32(&[1.0]);
        assert!(ImageFileWriter.write(&f, &path).is_err());
    }

    #[test]
    fn test_annotations_cursor() {
        let mut a = GalleryAnnotations::new(vec![vec![Rect::new(0.0, 0.0, 1.0, 1.0)], vec![]]);
        assert_eq!(a.next_regions().map(|r| r.len()), Some(1));
        assert_eq!(a.next_regions().map(|r| r.len()), Some(0));
        assert_eq!(a.next_regions(), None);
        a.rewind();
        assert!(a.next_regions().is_some());
    }
}
