//! # Gallery
//!
//! Uniform block streaming of records (metadata plus an optional feature
//! matrix) over heterogeneous dataset representations: binary dumps, the
//! universal-template interchange format, delimited text, Norpix sequence
//! files, directory trees and process-wide memory lists.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (errors, geometry, matrices)
//! - [`core`] - Records, descriptors, the gallery contract, registry and cache
//! - [`codec`] - Byte-level and text codecs shared by the backends
//! - [`gallery`] - Concrete backends
//!
//! ## Example
//!
//! ```ignore
//! use gallery::prelude::*;
//!
//! let mut source = gallery::open("faces.gal")?;
//! loop {
//!     let block = source.next_block()?;
//!     for record in &block.records {
//!         println!("{}", record.name);
//!     }
//!     if block.done {
//!         break;
//!     }
//! }
//! ```

pub mod util;
pub mod core;
pub mod codec;
pub mod gallery;

// Re-export commonly used types
pub use crate::core::{open, Block, Gallery, GalleryDescriptor, Record, Registry};
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        open, Block, Gallery, GalleryDescriptor, MemoryGalleries, Metadata, Record, Registry,
        Value,
    };
    pub use crate::util::{Depth, Error, Matrix, Point, Rect, Result};
}
