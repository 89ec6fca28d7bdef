//! On-disk layout of the per-project cache directory
//!
//! Manages the `.CodeRecoder/` structure:
//! ```text
//! .CodeRecoder/
//!   config/
//!     project.json
//!   snapshots/
//!     files/
//!       index.json
//!       <session_id>/<snapshot_id>/{<basename>, metadata.json}
//!     projects/
//!       index.json
//!       <snapshot_id>/
//!         snapshot_metadata.json
//!         <mirrored project files>
//!   history/
//!   analysis/
//! ```

use crate::{Error, Result};
use recoder_core::guard;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Name of the cache directory inside a project root
pub const CACHE_DIR_NAME: &str = ".CodeRecoder";

/// Project descriptor written at activation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub activated_at_ms: u64,
}

/// A bound `.CodeRecoder/` cache directory
///
/// Binding validates the project root through the path guard; a constructed
/// value is always Ready. The owning project root is immutable afterwards.
#[derive(Debug, Clone)]
pub struct CacheDir {
    project_root: PathBuf,
    cache_root: PathBuf,
}

impl CacheDir {
    /// Create (or reopen) the cache directory for a project root
    pub fn init(
        project_root: &Path,
        name: Option<&str>,
        language: Option<&str>,
    ) -> Result<Self> {
        let project_root = guard::validate(project_root, None).map_err(Error::invalid_path)?;
        if !project_root.is_dir() {
            return Err(Error::InvalidPath(format!(
                "Project root is not a directory: {}",
                project_root.display()
            )));
        }

        let cache_root = project_root.join(CACHE_DIR_NAME);
        fs::create_dir_all(cache_root.join("config"))?;
        fs::create_dir_all(cache_root.join("snapshots/files"))?;
        fs::create_dir_all(cache_root.join("snapshots/projects"))?;
        fs::create_dir_all(cache_root.join("history"))?;
        fs::create_dir_all(cache_root.join("analysis"))?;

        let dir = Self {
            project_root,
            cache_root,
        };

        let config = ProjectConfig {
            project_root: dir.project_root.clone(),
            name: name.map(|s| s.to_string()),
            language: language.map(|s| s.to_string()),
            activated_at_ms: now_ms(),
        };
        let bytes = serde_json::to_vec_pretty(&config)?;
        atomic_write(&dir.cache_root.join("config/project.json"), &bytes)?;

        Ok(dir)
    }

    /// Open an existing cache directory; fails if it was never initialised
    pub fn open(project_root: &Path) -> Result<Self> {
        let project_root = guard::validate(project_root, None).map_err(Error::invalid_path)?;
        let cache_root = project_root.join(CACHE_DIR_NAME);
        if !cache_root.is_dir() {
            return Err(Error::NotActivated);
        }
        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn files_dir(&self) -> PathBuf {
        self.cache_root.join("snapshots/files")
    }

    pub fn files_index_path(&self) -> PathBuf {
        self.files_dir().join("index.json")
    }

    pub fn file_snapshot_dir(&self, session_id: Uuid, snapshot_id: Uuid) -> PathBuf {
        self.files_dir()
            .join(session_id.to_string())
            .join(snapshot_id.to_string())
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.cache_root.join("snapshots/projects")
    }

    pub fn projects_index_path(&self) -> PathBuf {
        self.projects_dir().join("index.json")
    }

    pub fn project_snapshot_dir(&self, snapshot_id: Uuid) -> PathBuf {
        self.projects_dir().join(snapshot_id.to_string())
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.cache_root.join("analysis")
    }
}

/// Atomic write helper: temp file in the same directory, fsync, rename
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = target
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("No parent for {}", target.display())))?;
    fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    let mut temp_file = fs::File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, target)?;
    Ok(())
}

/// Current Unix time in milliseconds
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
