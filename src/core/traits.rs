//! Gallery contract and collaborator interfaces.
//!
//! A gallery is a pull-based producer of record blocks and a sink for single
//! records. Backends implement [`Gallery`] independently; shared behavior is
//! in the provided methods and the free-function codecs.

use std::path::Path;

use super::descriptor::GalleryDescriptor;
use super::record::Record;
use crate::util::{Error, Matrix, Rect, Result};

// ============================================================================
// Blocks
// ============================================================================

/// Result of one [`Gallery::read_block`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub records: Vec<Record>,
    /// This call reached the logical end of the source.
    pub done: bool,
}

impl Block {
    pub fn new(records: Vec<Record>, done: bool) -> Self {
        Self { records, done }
    }

    /// Empty terminal block.
    pub fn finished() -> Self {
        Self::new(Vec::new(), true)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Gallery
// ============================================================================

/// Streaming source/sink over one dataset representation.
///
/// Instances are single-threaded; move them between threads, do not share
/// them. An instance is either a reader or a writer for its lifetime.
pub trait Gallery: Send {
    /// Identity and options this gallery was opened with.
    fn descriptor(&self) -> &GalleryDescriptor;

    /// Read up to `max` records.
    ///
    /// After a block with `done == true`, seekable backends restart from the
    /// beginning on the next call; non-seekable ones keep returning
    /// [`Block::finished`].
    fn read_block(&mut self, max: usize) -> Result<Block>;

    /// Append one record.
    fn write(&mut self, record: &Record) -> Result<()>;

    /// Best-effort total size, in the same unit as [`Gallery::position`].
    fn total_size(&mut self) -> Result<u64>;

    /// Backend-native progress cursor.
    fn position(&self) -> u64;

    /// Records per block used by [`Gallery::next_block`].
    fn block_size(&self) -> usize;

    fn set_block_size(&mut self, size: usize);

    /// Flush buffered output. Called automatically on drop where the backend
    /// buffers; calling it explicitly surfaces errors.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Backend-sized block.
    fn next_block(&mut self) -> Result<Block> {
        let max = self.block_size();
        self.read_block(max)
    }

    /// One full pass over the source.
    fn read_all(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        loop {
            let block = self.next_block()?;
            records.extend(block.records);
            if block.done {
                return Ok(records);
            }
        }
    }

    /// Write every record in order.
    fn write_block(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Direction a gallery instance has committed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Reading,
    Writing,
}

/// Fixes a gallery's [`Mode`] on first use.
#[derive(Clone, Debug, Default)]
pub struct ModeGuard {
    mode: Option<Mode>,
}

impl ModeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit to `mode`, failing if the other mode was used before.
    pub fn enter(&mut self, mode: Mode, name: &str) -> Result<()> {
        match self.mode {
            None => {
                self.mode = Some(mode);
                Ok(())
            }
            Some(current) if current == mode => Ok(()),
            Some(_) => Err(Error::ModeConflict(name.to_string())),
        }
    }

    #[inline]
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Turns a compressed frame into pixels, inferring the channel layout from
/// the bytes.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Matrix>;
}

/// Persists a record's matrix as a file.
pub trait ImageWriter: Send + Sync {
    fn write(&self, matrix: &Matrix, destination: &Path) -> Result<()>;
}

/// Sequential cursor of per-frame region lists.
pub trait AnnotationSource: Send {
    /// Regions for the next frame; `None` once exhausted.
    fn next_regions(&mut self) -> Option<Vec<Rect>>;

    /// Rewind to the first frame.
    fn rewind(&mut self);
}
