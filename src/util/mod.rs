//! Utility types for galleries.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling
//! - [`Point`] / [`Rect`] - Geometry carried in metadata
//! - [`Matrix`] / [`Depth`] - Feature matrices

mod error;
mod geometry;
mod matrix;

pub use error::*;
pub use geometry::*;
pub use matrix::*;
