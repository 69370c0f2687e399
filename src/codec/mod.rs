//! Codecs - byte and line level record formats.
//!
//! This module provides free functions shared by the gallery backends:
//! - [`framed`] - literal binary record dump (`.gal`)
//! - [`universal`] - fixed header universal templates (`.ut`)
//! - [`sequence`] - Norpix sequence container header, offsets and frames
//! - [`json`] - newline-delimited JSON records
//! - [`text`] - url, txt, csv, landmarks, FDDB and ARFF lines
//! - [`names`] - wildcard filters and natural sort
//! - [`stream`] - short-read tolerant stream helpers

pub mod framed;
pub mod json;
pub mod names;
pub mod sequence;
pub mod stream;
pub mod text;
pub mod universal;

pub use sequence::{FrameLayout, SeqHeader};
pub use stream::{read_exact, read_exact_or_eof, read_fully, read_vec, Tracked};
pub use universal::UniversalHeader;
