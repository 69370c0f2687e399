//! Gallery descriptors: a logical identity plus ad hoc options.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::{Digest, Md5};

use super::metadata::Metadata;
use super::record::{split_bracketed, Record};
use super::value::Value;
use crate::util::{Error, Result};

/// Default number of records returned per block.
pub const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Option key overriding the block size.
pub const BLOCK_SIZE_KEY: &str = "blockSize";

/// Identity and configuration of a gallery.
///
/// Text form: `path[key=value,flag]`. Equality and hashing use the
/// canonical text form, so two descriptors with the same path and options
/// address the same gallery.
#[derive(Clone, Default)]
pub struct GalleryDescriptor {
    pub name: String,
    pub options: Metadata,
}

impl GalleryDescriptor {
    /// Descriptor with no options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Metadata::new(),
        }
    }

    /// Parse the `path[key=value,...]` form.
    pub fn parse(text: &str) -> Result<Self> {
        let (name, options) = split_bracketed(text)?;
        Ok(Self {
            name: name.to_string(),
            options,
        })
    }

    /// Set an option (builder form).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.set(key, value);
        self
    }

    /// Copy of this descriptor pointing at another name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: self.options.clone(),
        }
    }

    /// True for the empty descriptor, used as an "initialise only" idiom.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.name)
    }

    /// Extension without the dot ("" if none).
    pub fn suffix(&self) -> &str {
        self.path()
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// File name without directory or extension.
    pub fn base_name(&self) -> &str {
        self.path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path()
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Parent directory ("" if none).
    pub fn parent(&self) -> PathBuf {
        self.path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Name with the final `.suffix` removed.
    pub fn strip_suffix(&self) -> &str {
        let suffix = self.suffix();
        if suffix.is_empty() {
            &self.name
        } else {
            &self.name[..self.name.len() - suffix.len() - 1]
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.options.get_bool(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.options.get_string(key)
    }

    /// Non-negative integer option.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .filter(|n| *n >= 0)
                .map(|n| Some(n as usize))
                .ok_or_else(|| Error::InvalidDescriptor(format!("{}={} is not a count", key, v))),
        }
    }

    /// Configured block size, falling back to [`DEFAULT_BLOCK_SIZE`].
    pub fn block_size(&self) -> Result<usize> {
        match self.get_usize(BLOCK_SIZE_KEY)? {
            Some(0) => Err(Error::InvalidDescriptor("blockSize must be positive".into())),
            Some(n) => Ok(n),
            None => Ok(DEFAULT_BLOCK_SIZE),
        }
    }

    /// Canonical text form.
    pub fn flat(&self) -> String {
        if self.options.is_empty() {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.options.serialize())
        }
    }

    /// Hex MD5 of the canonical text form.
    pub fn hash_hex(&self) -> String {
        hex::encode(Md5::digest(self.flat().as_bytes()))
    }

    /// The descriptor as a metadata-only record.
    pub fn to_record(&self) -> Record {
        Record {
            name: self.name.clone(),
            metadata: self.options.clone(),
            matrix: None,
        }
    }
}

impl PartialEq for GalleryDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.flat() == other.flat()
    }
}

impl Eq for GalleryDescriptor {}

impl Hash for GalleryDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.flat().hash(state);
    }
}

impl fmt::Display for GalleryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flat())
    }
}

impl fmt::Debug for GalleryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GalleryDescriptor({})", self.flat())
    }
}

impl FromStr for GalleryDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&str> for GalleryDescriptor {
    /// Plain path without option parsing.
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&Path> for GalleryDescriptor {
    fn from(path: &Path) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for GalleryDescriptor {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_options() {
        let d = GalleryDescriptor::parse("out/faces.gal[append,blockSize=10]").unwrap();
        assert_eq!(d.name, "out/faces.gal");
        assert_eq!(d.suffix(), "gal");
        assert_eq!(d.base_name(), "faces");
        assert!(d.get_bool("append"));
        assert_eq!(d.block_size().unwrap(), 10);
    }

    #[test]
    fn test_block_size_default_and_invalid() {
        assert_eq!(GalleryDescriptor::new("a.gal").block_size().unwrap(), DEFAULT_BLOCK_SIZE);
        let d = GalleryDescriptor::new("a.gal").with(BLOCK_SIZE_KEY, 0i64);
        assert!(d.block_size().is_err());
        let d = GalleryDescriptor::new("a.gal").with(BLOCK_SIZE_KEY, "many");
        assert!(d.block_size().is_err());
    }

    #[test]
    fn test_strip_suffix() {
        assert_eq!(GalleryDescriptor::new("x/y.gal.mem").strip_suffix(), "x/y.gal");
        assert_eq!(GalleryDescriptor::new("dir").strip_suffix(), "dir");
    }

    #[test]
    fn test_identity() {
        let a = GalleryDescriptor::parse("a.mem[blockSize=5]").unwrap();
        let b = GalleryDescriptor::new("a.mem").with(BLOCK_SIZE_KEY, 5i64);
        let c = GalleryDescriptor::new("a.mem");
        let set: HashSet<_> = [a.clone(), b.clone(), c.clone()].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(set.len(), 2);
        assert_eq!(a.hash_hex(), b.hash_hex());
        assert_ne!(a.hash_hex(), c.hash_hex());
        assert_eq!(a.hash_hex().len(), 32);
    }
}
