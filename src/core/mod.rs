//! Core layer - record model, gallery contract and shared state.
//!
//! This module provides:
//! - [`Value`] / [`Metadata`] - typed, ordered key-value metadata
//! - [`Record`] - metadata plus an optional feature matrix
//! - [`GalleryDescriptor`] - gallery identity and per-instance options
//! - [`Gallery`] - the block-streaming contract, plus collaborator traits
//! - [`Registry`] - suffix based backend dispatch
//! - [`MemoryGalleries`] - process-wide record list cache

mod cache;
mod descriptor;
mod metadata;
mod record;
mod registry;
mod traits;
mod value;

pub use cache::{MemoryGalleries, RecordList};
pub use descriptor::{GalleryDescriptor, BLOCK_SIZE_KEY, DEFAULT_BLOCK_SIZE};
pub use metadata::Metadata;
pub use record::{Record, FTE_KEY, LABEL_KEY, POINTS_KEY, PROGRESS_KEY, RECTS_KEY};
pub use registry::{open, Factory, Registry, DEFAULT_FORMAT, DIRECTORY_FORMAT};
pub use traits::{
    AnnotationSource, Block, FrameDecoder, Gallery, ImageWriter, Mode, ModeGuard,
};
pub use value::{split_top_level, Value};
