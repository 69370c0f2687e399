//! Records: one metadata + payload unit streamed through a gallery.

use std::path::Path;

use md5::{Digest, Md5};

use super::metadata::Metadata;
use super::value::Value;
use crate::util::{Error, Matrix, Point, Rect, Result};

/// Metadata key marking a failure to enroll.
pub const FTE_KEY: &str = "FTE";
/// Metadata key holding the per-pass progress marker.
pub const PROGRESS_KEY: &str = "progress";
/// Metadata key holding the subject label.
pub const LABEL_KEY: &str = "Label";
/// Metadata key holding anonymous landmarks.
pub const POINTS_KEY: &str = "Points";
/// Metadata key holding anonymous regions.
pub const RECTS_KEY: &str = "Rects";

/// A named metadata map with an optional feature matrix.
///
/// `name` is the originating path (possibly empty for records that only
/// exist in a stream, such as universal templates).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    pub name: String,
    pub metadata: Metadata,
    pub matrix: Option<Matrix>,
}

impl Record {
    /// Create a metadata-only record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a record carrying a subject label.
    pub fn with_label(name: impl Into<String>, label: impl Into<Value>) -> Self {
        let mut record = Self::new(name);
        record.metadata.set(LABEL_KEY, label);
        record
    }

    /// Attach a matrix.
    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Set a metadata value (builder form).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.set(key, value);
        self
    }

    /// True if neither name nor metadata are set.
    pub fn is_null(&self) -> bool {
        self.name.is_empty() && self.metadata.is_empty()
    }

    /// True if the record carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.matrix.as_ref().map_or(true, Matrix::is_empty)
    }

    /// Failure-to-enroll marker.
    pub fn is_fte(&self) -> bool {
        self.metadata.get_bool(FTE_KEY)
    }

    pub fn set_fte(&mut self, fte: bool) {
        self.metadata.set(FTE_KEY, fte);
    }

    /// Payload size in bytes.
    pub fn bytes(&self) -> usize {
        self.matrix.as_ref().map_or(0, |m| m.data().len())
    }

    /// Drop the payload, keeping name and metadata.
    pub fn strip_matrix(&mut self) {
        self.matrix = None;
    }

    /// Progress marker assigned by the producing gallery.
    pub fn progress(&self) -> Option<i64> {
        self.metadata.get_i64(PROGRESS_KEY)
    }

    pub fn set_progress(&mut self, progress: impl Into<Value>) {
        self.metadata.set(PROGRESS_KEY, progress);
    }

    pub fn label(&self) -> Option<String> {
        self.metadata.get_string(LABEL_KEY)
    }

    /// Anonymous regions (`Rects`).
    pub fn rects(&self) -> Vec<Rect> {
        self.metadata
            .get(RECTS_KEY)
            .and_then(Value::as_rects)
            .unwrap_or_default()
    }

    pub fn set_rects(&mut self, rects: Vec<Rect>) {
        self.metadata.set(RECTS_KEY, rects);
    }

    /// Anonymous landmarks (`Points`).
    pub fn points(&self) -> Vec<Point> {
        self.metadata
            .get(POINTS_KEY)
            .and_then(Value::as_points)
            .unwrap_or_default()
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.metadata.set(POINTS_KEY, points);
    }

    // === Path helpers ===

    /// Final path component.
    pub fn file_name(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Final path component without its extension.
    pub fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Directory part of the name ("" for bare file names).
    pub fn path(&self) -> &str {
        Path::new(&self.name)
            .parent()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Content-independent identity: MD5 of the name and metadata, ignoring
    /// the payload and the progress marker.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        for (k, v) in self.metadata.iter() {
            if k == PROGRESS_KEY {
                continue;
            }
            hasher.update(k.as_bytes());
            hasher.update([b'=']);
            hasher.update(v.to_string().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Single-line `name[key=value,...]` form.
    pub fn flat(&self) -> String {
        if self.metadata.is_empty() {
            self.name.clone()
        } else {
            format!("{}[{}]", self.name, self.metadata.serialize())
        }
    }

    /// Parse the single-line `name[key=value,...]` form.
    pub fn parse_flat(line: &str) -> Result<Self> {
        let (name, metadata) = split_bracketed(line)?;
        Ok(Self {
            name: name.to_string(),
            metadata,
            matrix: None,
        })
    }
}

/// Split `name[options]` into the name and parsed options.
pub(crate) fn split_bracketed(text: &str) -> Result<(&str, Metadata)> {
    let text = text.trim();
    match text.find('[') {
        None => Ok((text, Metadata::new())),
        Some(open) => {
            let inner = text[open + 1..]
                .strip_suffix(']')
                .ok_or_else(|| Error::InvalidDescriptor(format!("unbalanced brackets in '{}'", text)))?;
            Ok((text[..open].trim(), Metadata::parse(inner)))
        }
    }
}

impl From<&str> for Record {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
