//! Persistent per-file baselines driving change detection
//!
//! The baseline map is owned by the project snapshot store and refreshed
//! during each snapshot; it is never hand-edited.

use crate::Result;
use recoder_core::hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The store's belief about one file's current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBaseline {
    pub size: u64,
    pub mtime_ms: u64,
    pub content_hash: String,
    /// Cached but unconsumed; kept for forward compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u64>,
}

/// Baselines keyed by root-relative path with `/` separators
pub type BaselineMap = BTreeMap<String, FileBaseline>;

impl FileBaseline {
    /// Capture a fresh baseline for a file (one streaming pass + one stat)
    pub fn capture(path: &Path) -> Result<Self> {
        let digest = hash::digest_file(path).map_err(crate::Error::io_other)?;
        let fp = hash::fingerprint(path).map_err(crate::Error::io_other)?;
        Ok(Self {
            size: digest.size,
            mtime_ms: fp.mtime_ms,
            content_hash: digest.hash.to_hex(),
            line_count: Some(digest.lines),
        })
    }

    /// Whether a stat fingerprint matches this baseline
    pub fn matches_fingerprint(&self, fp: &hash::Fingerprint) -> bool {
        self.size == fp.size && self.mtime_ms == fp.mtime_ms
    }
}
