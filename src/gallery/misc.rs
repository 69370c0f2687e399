//! Single-record backends: `.template`, `.stat` and the default gallery used
//! for any unregistered suffix.

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use super::image::ImageFileWriter;
use crate::core::{Block, Gallery, GalleryDescriptor, ImageWriter, Record};
use crate::util::{Depth, Error, Matrix, Result};

// ============================================================================
// Template
// ============================================================================

/// `x.bin.template` reads `x.bin` whole as a 1×N byte matrix.
pub struct TemplateGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
}

impl TemplateGallery {
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
        })
    }
}

impl Gallery for TemplateGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, _max: usize) -> Result<Block> {
        let source = self.descriptor.strip_suffix();
        let data = fs::read(source).map_err(|e| Error::from_open(source, e))?;
        let matrix = Matrix::new(1, data.len() as u32, Depth::U8, 1, data)?;
        let mut record = self.descriptor.to_record().with_matrix(matrix);
        record.set_progress(0);
        Ok(Block::new(vec![record], true))
    }

    fn write(&mut self, _record: &Record) -> Result<()> {
        Err(Error::NotSupported("writing template galleries"))
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(1)
    }

    fn position(&self) -> u64 {
        0
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }
}

pub(crate) fn open_template(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(TemplateGallery::new(d.clone())?))
}

// ============================================================================
// Default
// ============================================================================

/// The descriptor itself as the only record; writes store the matrix as an
/// image at the descriptor's path.
pub struct DefaultGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
    writer: Arc<dyn ImageWriter>,
}

impl DefaultGallery {
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            writer: Arc::new(ImageFileWriter),
        })
    }

    pub fn with_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.writer = writer;
        self
    }
}

impl Gallery for DefaultGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, _max: usize) -> Result<Block> {
        let mut record = self.descriptor.to_record();
        record.set_progress(0);
        Ok(Block::new(vec![record], true))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        let matrix = record
            .matrix
            .as_ref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::MissingField(format!("matrix of {}", record.name)))?;
        let parent = self.descriptor.parent();
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(&parent)?;
        }
        self.writer.write(matrix, self.descriptor.path())
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(1)
    }

    fn position(&self) -> u64 {
        0
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }
}

pub(crate) fn open_default(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(DefaultGallery::new(d.clone())?))
}

// ============================================================================
// Stat
// ============================================================================

/// Totals over the records written to a [`StatGallery`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatSummary {
    /// Distinct `Label` values, a missing label counting once.
    pub subjects: usize,
    /// Records without matrix bytes.
    pub empty: usize,
    pub total: usize,
    /// Mean bytes over non-empty records.
    pub mean_bytes: f64,
    /// Population standard deviation of bytes over non-empty records.
    pub std_bytes: f64,
}

/// Write-only sink that only counts.
pub struct StatGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
    subjects: BTreeSet<String>,
    bytes: Vec<usize>,
    closed: bool,
}

impl StatGallery {
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            subjects: BTreeSet::new(),
            bytes: Vec::new(),
            closed: false,
        })
    }

    pub fn summary(&self) -> StatSummary {
        let sizes: Vec<f64> = self
            .bytes
            .iter()
            .filter(|&&b| b > 0)
            .map(|&b| b as f64)
            .collect();
        let (mean, std) = if sizes.is_empty() {
            (0.0, 0.0)
        } else {
            let n = sizes.len() as f64;
            let mean = sizes.iter().sum::<f64>() / n;
            let var = sizes.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
            (mean, var.sqrt())
        };
        StatSummary {
            subjects: self.subjects.len(),
            empty: self.bytes.len() - sizes.len(),
            total: self.bytes.len(),
            mean_bytes: mean,
            std_bytes: std,
        }
    }
}

impl Gallery for StatGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, _max: usize) -> Result<Block> {
        let mut record = self.descriptor.to_record();
        record.set_progress(0);
        Ok(Block::new(vec![record], true))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        self.subjects.insert(record.label().unwrap_or_default());
        self.bytes.push(record.bytes());
        self.closed = false;
        Ok(())
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn position(&self) -> u64 {
        0
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }

    fn close(&mut self) -> Result<()> {
        if self.closed || self.bytes.is_empty() {
            return Ok(());
        }
        self.closed = true;
        let s = self.summary();
        info!(
            "Subjects: {} Empty records: {}/{} Bytes/record: {:.4} +/- {:.4}",
            s.subjects, s.empty, s.total, s.mean_bytes, s.std_bytes
        );
        Ok(())
    }
}

impl Drop for StatGallery {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing {}: {}", self.descriptor.name, e);
        }
    }
}

pub(crate) fn open_stat(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(StatGallery::new(d.clone())?))
}
