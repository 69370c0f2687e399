//! Gallery backends.
//!
//! Each backend implements [`Gallery`](crate::core::Gallery) on its own and
//! shares codecs from [`crate::codec`]:
//! - [`binary`] - `.gal`, `.ut`, `.url`, `.json` over files and process streams
//! - [`text`] - `.txt`, `.csv`, `.flat`, `.landmarks`, `.fddb`, `.arff`
//! - [`memory`] - `.mem` cached lists and the metadata-only scan
//! - [`directory`] - directory trees of files
//! - [`seq`] - Norpix sequence files
//! - [`misc`] - `.template`, `.stat` and the single-file default
//! - [`image`] - default decoder/writer collaborators

pub mod binary;
pub mod directory;
pub mod image;
pub mod memory;
pub mod misc;
pub mod seq;
pub mod text;

pub use binary::{BinaryGallery, Framing};
pub use directory::DirectoryGallery;
pub use image::{GalleryAnnotations, ImageFileWriter, ImageFrameDecoder};
pub use memory::{metadata_scan, MemoryGallery};
pub use misc::{DefaultGallery, StatGallery, StatSummary, TemplateGallery};
pub use seq::SeqGallery;
pub use text::{ArffGallery, LineFormat, ListFormat, ListGallery, TextGallery};

use crate::core::{Block, Factory, Record, DEFAULT_FORMAT, DIRECTORY_FORMAT};

/// Format names and constructors of every built-in backend.
pub(crate) fn builtin_factories() -> Vec<(&'static str, Factory)> {
    vec![
        ("gal", binary::open_gal as Factory),
        ("ut", binary::open_ut),
        ("url", binary::open_url),
        ("json", binary::open_json),
        ("txt", text::open_txt),
        ("csv", text::open_csv),
        ("flat", text::open_flat),
        ("landmarks", text::open_landmarks),
        ("fddb", text::open_fddb),
        ("arff", text::open_arff),
        ("mem", memory::open_mem),
        ("seq", seq::open_seq),
        ("template", misc::open_template),
        ("stat", misc::open_stat),
        (DEFAULT_FORMAT, misc::open_default),
        (DIRECTORY_FORMAT, directory::open_directory),
    ]
}

/// Block-wise replay of a materialized list.
///
/// Progress is the record index. The block that reaches the end reports
/// `done`; the next call starts over.
#[derive(Clone, Debug, Default)]
pub(crate) struct ListCursor {
    next: usize,
}

impl ListCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self, list: &[Record], max: usize) -> Block {
        let start = self.next.min(list.len());
        let end = start.saturating_add(max).min(list.len());
        let records = list[start..end]
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut r = r.clone();
                r.set_progress(start + i);
                r
            })
            .collect();
        let done = end >= list.len();
        self.next = if done { 0 } else { end };
        Block::new(records, done)
    }

    pub fn position(&self) -> u64 {
        self.next as u64
    }
}
