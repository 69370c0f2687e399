//! Directory galleries: a descriptor without a suffix names a directory whose
//! files become records.
//!
//! Immediate subdirectories are listed in parallel, one task each, in
//! natural order; their files are labelled with the subdirectory name. Files
//! directly in the root follow, labelled with the root name. Writing puts
//! files under the root.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::debug;

use super::image::ImageFileWriter;
use super::ListCursor;
use crate::codec::names::{natural_cmp, wildcard};
use crate::core::{Block, Gallery, GalleryDescriptor, ImageWriter, Mode, ModeGuard, Record};
use crate::util::{Error, Result};

/// Wildcard applied to file names.
pub const REGEXP_OPTION: &str = "regexp";
/// Mirror the record's directory under the root when writing.
pub const PRESERVE_PATH_OPTION: &str = "preservePath";
/// Replacement extension (including the dot) for written files.
pub const NEW_FORMAT_OPTION: &str = "newFormat";

/// Serializes filesystem writes from all directory galleries in the process.
static DISK_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Gallery over the files of a directory tree.
pub struct DirectoryGallery {
    descriptor: GalleryDescriptor,
    block_size: usize,
    writer: Arc<dyn ImageWriter>,
    listing: Option<Vec<Record>>,
    /// The last pass finished; list again on the next read.
    stale: bool,
    cursor: ListCursor,
    mode: ModeGuard,
}

impl DirectoryGallery {
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Ok(Self {
            block_size: descriptor.block_size()?,
            descriptor,
            writer: Arc::new(ImageFileWriter),
            listing: None,
            stale: false,
            cursor: ListCursor::new(),
            mode: ModeGuard::new(),
        })
    }

    /// Use another collaborator for records that carry a matrix.
    pub fn with_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.writer = writer;
        self
    }

    fn listing(&mut self) -> Result<&[Record]> {
        if self.listing.is_none() {
            let records = if self.descriptor.is_null() {
                Vec::new()
            } else {
                enumerate(
                    self.descriptor.path(),
                    self.descriptor.get_string(REGEXP_OPTION).as_deref(),
                )?
            };
            self.listing = Some(records);
        }
        Ok(self.listing.as_deref().unwrap_or_default())
    }

    /// Where `record` lands under the root.
    pub fn destination(&self, record: &Record) -> PathBuf {
        let mut dest = self.descriptor.path().to_path_buf();
        if self.descriptor.get_bool(PRESERVE_PATH_OPTION) {
            for part in Path::new(record.path()).components() {
                if let Component::Normal(part) = part {
                    dest.push(part);
                }
            }
        }
        match self.descriptor.get_string(NEW_FORMAT_OPTION).filter(|f| !f.is_empty()) {
            Some(format) => dest.push(format!("{}{}", record.base_name(), format)),
            None => dest.push(record.file_name()),
        }
        dest
    }
}

impl Gallery for DirectoryGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    /// Each pass lists the tree once; blocks of that listing are handed out
    /// until the pass is done.
    fn read_block(&mut self, max: usize) -> Result<Block> {
        self.mode.enter(Mode::Reading, &self.descriptor.name)?;
        if self.stale {
            self.listing = None;
            self.stale = false;
        }
        self.listing()?;
        let listing = self.listing.as_deref().unwrap_or_default();
        let block = self.cursor.take(listing, max);
        self.stale = block.done;
        Ok(block)
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        self.mode.enter(Mode::Writing, &self.descriptor.name)?;
        if self.descriptor.is_null() {
            return Ok(());
        }
        let dest = self.destination(record);

        let _guard = DISK_LOCK.lock();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match record.matrix.as_ref().filter(|m| !m.is_empty()) {
            None => {
                let source = Path::new(&record.name);
                fs::copy(source, &dest).map_err(|e| Error::from_open(source, e))?;
            }
            Some(matrix) => self.writer.write(matrix, &dest)?,
        }
        debug!("wrote {}", dest.display());
        Ok(())
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.listing()?.len() as u64)
    }

    fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, size: usize) {
        self.block_size = size.max(1);
    }
}

pub(crate) fn open_directory(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(DirectoryGallery::new(d.clone())?))
}

/// List `root`: files of each subdirectory (recursively), then the files of
/// the root itself, optionally filtered by a wildcard on the file name.
pub fn enumerate(root: &Path, pattern: Option<&str>) -> Result<Vec<Record>> {
    if !root.is_dir() {
        return Err(Error::MissingSource(root.to_path_buf()));
    }
    let (subdirs, files) = entries(root)?;

    let per_dir: Vec<Vec<Record>> = subdirs
        .par_iter()
        .map(|dir| -> Result<Vec<Record>> {
            let label = file_name(dir);
            Ok(files_recursive(dir)?
                .into_iter()
                .map(|f| Record::with_label(f.to_string_lossy(), label.clone()))
                .collect())
        })
        .collect::<Result<_>>()?;

    let root_label = file_name(root);
    let mut records: Vec<Record> = per_dir.into_iter().flatten().collect();
    records.extend(
        files
            .into_iter()
            .map(|f| Record::with_label(f.to_string_lossy(), root_label.clone())),
    );

    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        let re = wildcard(pattern)?;
        records.retain(|r| re.is_match(r.file_name()));
    }

    debug!("{}: {} files", root.display(), records.len());
    Ok(records)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Visible subdirectories and files of `dir`, each in natural order.
fn entries(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    let by_name = |a: &PathBuf, b: &PathBuf| natural_cmp(&file_name(a), &file_name(b));
    dirs.sort_by(by_name);
    files.sort_by(by_name);
    Ok((dirs, files))
}

/// Files of `dir` followed by those of its subdirectories, depth first.
fn files_recursive(dir: &Path) -> Result<Vec<PathBuf>> {
    let (dirs, mut files) = entries(dir)?;
    for sub in dirs {
        files.extend(files_recursive(&sub)?);
    }
    Ok(files)
}
