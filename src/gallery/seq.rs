//! Norpix sequence galleries (`.seq`), read-only.
//!
//! The header and frame offset table are built on first use. Each frame
//! becomes a record named after the sequence, with `position` set to the
//! frame index. Regions from an annotation source are attached to frames in
//! order.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tracing::{debug, info};

use super::image::{GalleryAnnotations, ImageFrameDecoder};
use crate::codec::sequence::{self, SeqHeader};
use crate::core::{
    AnnotationSource, Block, FrameDecoder, Gallery, GalleryDescriptor, Record, Registry,
};
use crate::util::{Error, Result};

/// Descriptor option naming a gallery that supplies per-frame `Rects`.
pub const ANNOTATIONS_OPTION: &str = "annotations";

/// Metadata key of the frame index.
pub const POSITION_KEY: &str = "position";

/// Metadata key of the header description text.
pub const DESCRIPTION_KEY: &str = "Description";

struct SeqFile {
    reader: BufReader<File>,
    header: SeqHeader,
    offsets: Vec<u64>,
}

/// Frame-per-record gallery over a sequence file.
pub struct SeqGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
    decoder: Arc<dyn FrameDecoder>,
    annotations: Option<Box<dyn AnnotationSource>>,
    file: Option<SeqFile>,
    next: usize,
}

impl SeqGallery {
    /// Gallery with the image-crate decoder and annotations from the
    /// `annotations` option, if set.
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        let annotations = match descriptor.get_string(ANNOTATIONS_OPTION) {
            Some(source) if !source.is_empty() => {
                let mut gallery = Registry::global().open(&GalleryDescriptor::parse(&source)?)?;
                let regions = GalleryAnnotations::from_gallery(gallery.as_mut())?;
                debug!("{} annotated frames from {}", regions.len(), source);
                Some(Box::new(regions) as Box<dyn AnnotationSource>)
            }
            _ => None,
        };
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            decoder: Arc::new(ImageFrameDecoder),
            annotations,
            file: None,
            next: 0,
        })
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_annotations(mut self, annotations: Box<dyn AnnotationSource>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Parsed header, opening the file if needed.
    pub fn header(&mut self) -> Result<&SeqHeader> {
        Ok(&self.open()?.header)
    }

    fn open(&mut self) -> Result<&mut SeqFile> {
        if self.file.is_none() {
            let path = self.descriptor.path();
            let file = File::open(path).map_err(|e| Error::from_open(path, e))?;
            let mut reader = BufReader::new(file);
            let header = sequence::read_header(&mut reader)?;
            let offsets = sequence::frame_offsets(&mut reader, &header)?;
            info!(
                "{}: {} frames of {}x{}",
                self.descriptor.name,
                offsets.len(),
                header.width,
                header.height
            );
            self.file = Some(SeqFile {
                reader,
                header,
                offsets,
            });
        }
        self.file
            .as_mut()
            .ok_or_else(|| Error::malformed("sequence file not open"))
    }
}

impl Gallery for SeqGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, max: usize) -> Result<Block> {
        let frame_count = self.open()?.offsets.len();
        if self.next >= frame_count {
            self.next = 0;
            if let Some(a) = self.annotations.as_mut() {
                a.rewind();
            }
        }

        let mut records = Vec::new();
        while records.len() < max && self.next < frame_count {
            let index = self.next;
            let decoder = Arc::clone(&self.decoder);
            let seq = self.open()?;
            let matrix = sequence::read_frame(
                &mut seq.reader,
                &seq.header,
                seq.offsets[index],
                decoder.as_ref(),
            )?;
            let description = seq.header.description.clone();

            let mut record = self.descriptor.to_record().with_matrix(matrix);
            record.metadata.remove(ANNOTATIONS_OPTION);
            if !description.is_empty() {
                record.metadata.set(DESCRIPTION_KEY, description);
            }
            if let Some(rects) = self.annotations.as_mut().and_then(|a| a.next_regions()) {
                record.set_rects(rects);
            }
            record.metadata.set(POSITION_KEY, index);
            record.set_progress(index);
            records.push(record);
            self.next += 1;
        }

        Ok(Block::new(records, self.next >= frame_count))
    }

    fn write(&mut self, _record: &Record) -> Result<()> {
        Err(Error::NotSupported("writing sequence files"))
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.open()?.offsets.len() as u64)
    }

    fn position(&self) -> u64 {
        self.next as u64
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }
}

pub(crate) fn open_seq(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(SeqGallery::new(d.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::sequence::{write_compressed_frame, FrameLayout};
    use crate::util::{Matrix, Rect};

    fn raw_seq(dir: &tempfile::TempDir, frames: u32) -> GalleryDescriptor {
        let header = SeqHeader {
            description: "cam 1".into(),
            width: 2,
            height: 2,
            channels: 1,
            image_size: 4,
            format_code: 100,
            layout: FrameLayout::Raw,
            frame_count: frames,
            true_image_size: 8,
        };
        let mut bytes = header.encode().unwrap();
        for i in 0..frames as u8 {
            bytes.extend([i; 4]);
            bytes.extend([0xFF; 4]);
        }
        let path = dir.path().join("cam.seq");
        std::fs::write(&path, bytes).unwrap();
        GalleryDescriptor::new(path.to_string_lossy().to_string())
    }

    #[test]
    fn test_raw_frames_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = SeqGallery::new(raw_seq(&dir, 5)).unwrap();
        assert_eq!(g.total_size().unwrap(), 5);
        assert_eq!(g.header().unwrap().description, "cam 1");

        let a = g.read_block(2).unwrap();
        let b = g.read_block(2).unwrap();
        let c = g.read_block(2).unwrap();
        assert!(!a.done && !b.done && c.done);
        assert_eq!(c.len(), 1);
        assert_eq!(c.records[0].matrix.as_ref().unwrap().data(), &[4, 4, 4, 4]);
        assert_eq!(c.records[0].metadata.get_i64("position"), Some(4));
        assert_eq!(c.records[0].metadata.get_string("Description").as_deref(), Some("cam 1"));

        // next pass restarts
        let again = g.read_block(1).unwrap();
        assert_eq!(again.records[0].metadata.get_i64("position"), Some(0));
    }

    struct LenDecoder;

    impl FrameDecoder for LenDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<Matrix> {
            Ok(Matrix::from_bytes(bytes.to_vec()))
        }
    }

    #[test]
    fn test_compressed_with_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let header = SeqHeader {
            description: String::new(),
            width: 0,
            height: 0,
            channels: 1,
            image_size: 0,
            format_code: 102,
            layout: FrameLayout::Compressed,
            frame_count: 2,
            true_image_size: 0,
        };
        let mut bytes = header.encode().unwrap();
        write_compressed_frame(&mut bytes, b"first", 16).unwrap();
        write_compressed_frame(&mut bytes, b"second", 16).unwrap();
        let path = dir.path().join("c.seq");
        std::fs::write(&path, bytes).unwrap();

        let annotations = GalleryAnnotations::new(vec![vec![Rect::new(1.0, 1.0, 2.0, 2.0)]]);
        let mut g = SeqGallery::new(GalleryDescriptor::new(path.to_string_lossy().to_string()))
            .unwrap()
            .with_decoder(Arc::new(LenDecoder))
            .with_annotations(Box::new(annotations));

        let all = g.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].matrix.as_ref().unwrap().data(), b"second");
        assert_eq!(all[0].rects(), vec![Rect::new(1.0, 1.0, 2.0, 2.0)]);
        assert!(all[1].rects().is_empty());
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = SeqGallery::new(GalleryDescriptor::new("/nonexistent/a.seq")).unwrap();
        assert!(matches!(g.read_block(1), Err(Error::MissingSource(_))));

        let path = dir.path().join("bad.seq");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let mut g = SeqGallery::new(GalleryDescriptor::new(path.to_string_lossy().to_string())).unwrap();
        assert!(matches!(g.read_block(1), Err(Error::MalformedHeader(_))));
        assert!(matches!(g.write(&Record::new("x")), Err(Error::NotSupported(_))));
    }
}
