//! Format registry: maps descriptor suffixes to backend constructors.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::descriptor::GalleryDescriptor;
use super::traits::Gallery;
use crate::util::{Error, Result};

/// Constructs a backend for a descriptor.
pub type Factory = fn(&GalleryDescriptor) -> Result<Box<dyn Gallery>>;

/// Registry key used for descriptors without a suffix.
pub const DIRECTORY_FORMAT: &str = "";

/// Registry key used for unregistered suffixes.
pub const DEFAULT_FORMAT: &str = "default";

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::with_builtins);

/// Suffix to factory table.
pub struct Registry {
    factories: RwLock<HashMap<String, Factory>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding every backend shipped with the crate.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, factory) in crate::gallery::builtin_factories() {
            registry.register(name, factory);
        }
        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register (or replace) the factory for `format`.
    pub fn register(&self, format: impl Into<String>, factory: Factory) {
        self.factories.write().insert(format.into(), factory);
    }

    pub fn contains(&self, format: &str) -> bool {
        self.factories.read().contains_key(format)
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Format name a descriptor dispatches to.
    pub fn resolve(&self, descriptor: &GalleryDescriptor) -> Result<String> {
        let suffix = descriptor.suffix();
        let factories = self.factories.read();
        if factories.contains_key(suffix) {
            Ok(suffix.to_string())
        } else if factories.contains_key(DEFAULT_FORMAT) {
            Ok(DEFAULT_FORMAT.to_string())
        } else {
            Err(Error::UnknownGallery(descriptor.name.clone()))
        }
    }

    /// Construct the backend for `descriptor`.
    pub fn open(&self, descriptor: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
        let format = self.resolve(descriptor)?;
        let factory = self
            .factories
            .read()
            .get(&format)
            .copied()
            .ok_or_else(|| Error::UnknownGallery(format.clone()))?;
        debug!("opening {} as '{}'", descriptor, format);
        factory(descriptor)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a gallery from its textual descriptor using the global registry.
pub fn open(descriptor: &str) -> Result<Box<dyn Gallery>> {
    Registry::global().open(&GalleryDescriptor::parse(descriptor)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_builtins() {
        let registry = Registry::global();
        let resolve = |s: &str| registry.resolve(&GalleryDescriptor::new(s)).unwrap();
        assert_eq!(resolve("a.gal"), "gal");
        assert_eq!(resolve("dir/a.ut"), "ut");
        assert_eq!(resolve("video.seq"), "seq");
        assert_eq!(resolve("faces"), DIRECTORY_FORMAT);
        assert_eq!(resolve("photo.jpg"), DEFAULT_FORMAT);
    }

    #[test]
    fn test_empty_registry() {
        let registry = Registry::new();
        assert!(matches!(
            registry.open(&GalleryDescriptor::new("a.gal")),
            Err(Error::UnknownGallery(_))
        ));
    }

    #[test]
    fn test_register_custom() {
        fn unsupported(_: &GalleryDescriptor) -> Result<Box<dyn Gallery>> {
            Err(Error::NotSupported("custom"))
        }
        let registry = Registry::new();
        registry.register("xyz", unsupported);
        assert!(registry.contains("xyz"));
        assert_eq!(registry.formats(), vec!["xyz".to_string()]);
        assert!(matches!(
            registry.open(&GalleryDescriptor::new("a.xyz")),
            Err(Error::NotSupported("custom"))
        ));
    }
}
