//! Memory galleries (`.mem`) and the metadata-only scan.
//!
//! A memory gallery replays a list held in [`MemoryGalleries`]. Opening
//! `faces.gal.mem` when `faces.gal` exists loads that gallery into the cache
//! once; writes append to the cached list.

use tracing::debug;

use super::ListCursor;
use crate::core::{
    Block, Gallery, GalleryDescriptor, MemoryGalleries, Mode, ModeGuard, Record, RecordList,
    Registry,
};
use crate::util::Result;

/// Formats whose records carry matrices; scanned in small blocks.
const PAYLOAD_FORMATS: [&str; 4] = ["gal", "mem", "template", "ut"];

/// Block size used when scanning payload-bearing formats.
pub const SCAN_BLOCK_SIZE: usize = 10;

/// Gallery over a cached record list.
pub struct MemoryGallery {
    descriptor: GalleryDescriptor,
    cache: &'static MemoryGalleries,
    block_size: usize,
    cursor: ListCursor,
    mode: ModeGuard,
}

impl MemoryGallery {
    /// Open against the process-wide cache.
    pub fn new(descriptor: GalleryDescriptor) -> Result<Self> {
        Self::with_cache(descriptor, MemoryGalleries::global())
    }

    pub fn with_cache(descriptor: GalleryDescriptor, cache: &'static MemoryGalleries) -> Result<Self> {
        let gallery = Self {
            block_size: descriptor.block_size()?,
            descriptor,
            cache,
            cursor: ListCursor::new(),
            mode: ModeGuard::new(),
        };
        gallery.preload()?;
        Ok(gallery)
    }

    /// Load the backing gallery named by the descriptor minus `.mem`.
    fn preload(&self) -> Result<()> {
        let backing = self.descriptor.with_name(self.descriptor.strip_suffix());
        if backing.suffix().is_empty()
            || backing.suffix() == "mem"
            || !backing.path().is_file()
            || self.cache.contains(&self.descriptor)
        {
            return Ok(());
        }
        self.cache.get_or_load(&self.descriptor, || {
            debug!("loading {} into memory", backing.name);
            Registry::global().open(&backing)?.read_all()
        })?;
        Ok(())
    }

    fn list(&self) -> RecordList {
        self.cache.get(&self.descriptor).unwrap_or_default()
    }
}

impl Gallery for MemoryGallery {
    fn descriptor(&self) -> &GalleryDescriptor {
        &self.descriptor
    }

    fn read_block(&mut self, max: usize) -> Result<Block> {
        self.mode.enter(Mode::Reading, &self.descriptor.name)?;
        let list = self.list();
        Ok(self.cursor.take(&list, max))
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        self.mode.enter(Mode::Writing, &self.descriptor.name)?;
        self.cache.append(&self.descriptor, record.clone());
        Ok(())
    }

    fn total_size(&mut self) -> Result<u64> {
        Ok(self.list().len() as u64)
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

pub(crate) fn open_mem(d: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
    Ok(Box::new(MemoryGallery::new(d.clone())?))
}

/// Descriptor of the metadata-only cache entry for `descriptor`:
/// `<dir>/<base>_meta<md5>.mem`.
pub fn metadata_key(descriptor: &GalleryDescriptor) -> GalleryDescriptor {
    let mut source = descriptor.clone();
    source.options.remove("append");
    let file = format!("{}_meta{}.mem", source.base_name(), source.hash_hex());
    let name = match source.parent() {
        p if p.as_os_str().is_empty() => file,
        p => p.join(file).to_string_lossy().into_owned(),
    };
    GalleryDescriptor::new(name)
}

/// All records of a gallery with their matrices dropped.
///
/// Payload-bearing formats are read in blocks of [`SCAN_BLOCK_SIZE`] so only
/// a few matrices are alive at a time. With `cache` set the result is kept in
/// the process-wide cache and later scans return it without touching the
/// source.
pub fn metadata_scan(descriptor: &GalleryDescriptor, cache: bool) -> Result<Vec<Record>> {
    let key = metadata_key(descriptor);
    let memory = MemoryGalleries::global();
    if let Some(list) = memory.get(&key) {
        return Ok(list.as_ref().clone());
    }

    let mut source = descriptor.clone();
    source.options.remove("append");
    let mut gallery = Registry::global().open(&source)?;

    let records = if PAYLOAD_FORMATS.contains(&source.suffix()) {
        gallery.set_block_size(SCAN_BLOCK_SIZE);
        let mut records = Vec::new();
        loop {
            let block = gallery.next_block()?;
            records.extend(block.records.into_iter().map(|mut r| {
                r.strip_matrix();
                r
            }));
            if block.done {
                break;
            }
        }
        records
    } else {
        gallery.read_all()?
    };

    if cache {
        debug!("caching metadata of {} as {}", source.name, key.name);
        memory.insert(&key, records.clone());
    }
    Ok(records)
}
