//! File-level snapshot store: single-file backups grouped into sessions
//!
//! One content copy per snapshot under `snapshots/files/<session>/<id>/`,
//! integrity-checked on restore, with a timestamped backup of whatever the
//! restore overwrites.

use crate::layout::{atomic_write, now_ms, CacheDir};
use crate::lock::{LockManager, SAVE_DATA};
use crate::{Error, Result};
use parking_lot::RwLock;
use recoder_core::{copier, guard, hash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A captured copy of one file at a moment in time
///
/// Immutable once created, except for the enrichment fields which the
/// async enrichment writer may fill in later. Readers tolerate their
/// absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    pub id: Uuid,
    /// Creation time (Unix milliseconds)
    pub timestamp: u64,
    pub original_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub file_size: u64,
    #[serde(rename = "fileHash")]
    pub content_hash: String,
    pub prompt: String,
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A named grouping of related file snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSession {
    pub id: Uuid,
    pub name: String,
    pub created: u64,
    pub last_modified: u64,
    #[serde(default)]
    pub snapshot_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_id: Option<Uuid>,
}

/// Persistent index of the file store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStoreIndex {
    #[serde(default)]
    sessions: BTreeMap<Uuid, SnapshotSession>,
    #[serde(default)]
    snapshots: BTreeMap<Uuid, FileSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_session_id: Option<Uuid>,
}

/// Result of restoring a file snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredFile {
    pub restored_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

/// The file-level snapshot store bound to one cache directory
pub struct FileSnapshotStore {
    cache: CacheDir,
    locks: LockManager,
    inner: RwLock<FileStoreIndex>,
}

impl FileSnapshotStore {
    /// Bind the store, loading the index if one exists
    pub fn bind(cache: CacheDir) -> Result<Self> {
        let index_path = cache.files_index_path();
        let index = if index_path.is_file() {
            serde_json::from_slice(&std::fs::read(&index_path)?)?
        } else {
            FileStoreIndex::default()
        };

        Ok(Self {
            cache,
            locks: LockManager::new(),
            inner: RwLock::new(index),
        })
    }

    /// Capture a snapshot of one file
    pub fn create_snapshot(
        &self,
        file_path: &Path,
        prompt: &str,
        session_id: Option<Uuid>,
        parent_id: Option<Uuid>,
        metadata: Option<Value>,
    ) -> Result<FileSnapshot> {
        let source = guard::validate(file_path, Some(self.cache.project_root()))
            .map_err(Error::invalid_path)?;
        if !source.is_file() {
            return Err(Error::NotFound(format!(
                "Source file does not exist: {}",
                source.display()
            )));
        }

        let digest = hash::digest_file(&source).map_err(Error::io_other)?;

        self.locks.with_lock(SAVE_DATA, || {
            let mut index = self.inner.write();
            let session_id = Self::resolve_session(&mut index, session_id)?;

            let id = Uuid::new_v4();
            let snapshot_dir = self.cache.file_snapshot_dir(session_id, id);
            std::fs::create_dir_all(&snapshot_dir)?;

            let basename = source
                .file_name()
                .ok_or_else(|| Error::InvalidPath(format!("No file name: {}", source.display())))?;
            let stored = snapshot_dir.join(basename);

            if let Err(err) = copier::copy_file(&source, &stored) {
                // Nothing is committed to the index on a failed copy
                let _ = std::fs::remove_dir_all(&snapshot_dir);
                return Err(Error::io_other(err));
            }

            let snapshot = FileSnapshot {
                id,
                timestamp: now_ms(),
                original_path: source.clone(),
                snapshot_path: stored,
                file_size: digest.size,
                content_hash: digest.hash.to_hex(),
                prompt: prompt.to_string(),
                session_id,
                parent_snapshot_id: parent_id,
                ai_summary: None,
                change_analysis: None,
                metadata,
            };

            write_snapshot_metadata(&snapshot_dir, &snapshot)?;

            let session = index.sessions.get_mut(&session_id).expect("session resolved");
            session.snapshot_ids.push(id);
            session.last_modified = snapshot.timestamp;
            session.current_id = Some(id);
            index.snapshots.insert(id, snapshot.clone());

            self.persist(&index)?;
            tracing::info!(snapshot = %id, file = %source.display(), "file snapshot created");
            Ok(snapshot)
        })
    }

    /// Restore a snapshot over its original path, backing up the current file
    pub fn restore_snapshot(&self, snapshot_id: Uuid) -> Result<RestoredFile> {
        let snapshot = self
            .get(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("File snapshot {snapshot_id}")))?;

        // Integrity: the stored copy must still match the recorded size
        let stored_meta = std::fs::metadata(&snapshot.snapshot_path).map_err(|err| {
            Error::Corrupt(format!(
                "Stored copy unreadable for snapshot {snapshot_id}: {err}"
            ))
        })?;
        if stored_meta.len() != snapshot.file_size {
            return Err(Error::Corrupt(format!(
                "Stored copy size {} != recorded {} for snapshot {}",
                stored_meta.len(),
                snapshot.file_size,
                snapshot_id
            )));
        }

        let destination = guard::validate(&snapshot.original_path, Some(self.cache.project_root()))
            .map_err(Error::invalid_path)?;

        let backup_path = if destination.exists() {
            let name = destination
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let backup = destination.with_file_name(format!("{}.backup.{}", name, now_ms()));
            copier::copy_file(&destination, &backup).map_err(Error::io_other)?;
            Some(backup)
        } else {
            None
        };

        copier::copy_file(&snapshot.snapshot_path, &destination).map_err(Error::io_other)?;

        self.locks.with_lock(SAVE_DATA, || {
            let mut index = self.inner.write();
            if let Some(session) = index.sessions.get_mut(&snapshot.session_id) {
                session.current_id = Some(snapshot_id);
                session.last_modified = now_ms();
            }
            self.persist(&index)
        })?;

        tracing::info!(snapshot = %snapshot_id, file = %destination.display(), "file snapshot restored");
        Ok(RestoredFile {
            restored_path: destination,
            backup_path,
        })
    }

    /// List snapshots newest-first, optionally filtered
    pub fn list_snapshots(
        &self,
        session_id: Option<Uuid>,
        file_path: Option<&Path>,
        limit: Option<usize>,
    ) -> Vec<FileSnapshot> {
        let index = self.inner.read();
        let mut snapshots: Vec<FileSnapshot> = index
            .snapshots
            .values()
            .filter(|s| session_id.map_or(true, |id| s.session_id == id))
            .filter(|s| file_path.map_or(true, |p| s.original_path == p))
            .cloned()
            .collect();

        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            snapshots.truncate(limit);
        }
        snapshots
    }

    /// Remove a snapshot's payload and index entry
    pub fn delete_snapshot(&self, snapshot_id: Uuid) -> Result<()> {
        self.locks.with_lock(SAVE_DATA, || {
            let mut index = self.inner.write();
            let snapshot = index
                .snapshots
                .get(&snapshot_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("File snapshot {snapshot_id}")))?;

            let dir = self
                .cache
                .file_snapshot_dir(snapshot.session_id, snapshot_id);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }

            index.snapshots.remove(&snapshot_id);
            let newest_remaining = index
                .snapshots
                .values()
                .filter(|s| s.session_id == snapshot.session_id)
                .max_by_key(|s| (s.timestamp, s.id))
                .map(|s| s.id);
            if let Some(session) = index.sessions.get_mut(&snapshot.session_id) {
                session.snapshot_ids.retain(|id| *id != snapshot_id);
                if session.current_id == Some(snapshot_id) {
                    session.current_id = newest_remaining;
                }
            }

            self.persist(&index)
        })
    }

    /// Enrichment writer seam: only the enrichment fields may change
    ///
    /// Serialised through the same write lock as every other index write.
    pub fn apply_enrichment(
        &self,
        snapshot_id: Uuid,
        summary: Option<String>,
        analysis: Option<String>,
    ) -> Result<()> {
        self.locks.with_lock(SAVE_DATA, || {
            let mut index = self.inner.write();
            let snapshot = index
                .snapshots
                .get_mut(&snapshot_id)
                .ok_or_else(|| Error::NotFound(format!("File snapshot {snapshot_id}")))?;

            if let Some(summary) = summary {
                snapshot.ai_summary = Some(summary);
            }
            if let Some(analysis) = analysis {
                snapshot.change_analysis = Some(analysis);
            }

            let snapshot = snapshot.clone();
            let dir = self
                .cache
                .file_snapshot_dir(snapshot.session_id, snapshot_id);
            write_snapshot_metadata(&dir, &snapshot)?;
            self.persist(&index)
        })
    }

    /// Look up a snapshot by id
    pub fn get(&self, snapshot_id: Uuid) -> Option<FileSnapshot> {
        self.inner.read().snapshots.get(&snapshot_id).cloned()
    }

    /// All sessions, most recently modified first
    pub fn sessions(&self) -> Vec<SnapshotSession> {
        let index = self.inner.read();
        let mut sessions: Vec<SnapshotSession> = index.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        sessions
    }

    fn resolve_session(index: &mut FileStoreIndex, requested: Option<Uuid>) -> Result<Uuid> {
        if let Some(id) = requested {
            if !index.sessions.contains_key(&id) {
                return Err(Error::NotFound(format!("Session {id}")));
            }
            index.current_session_id = Some(id);
            return Ok(id);
        }

        if let Some(current) = index.current_session_id {
            if index.sessions.contains_key(&current) {
                return Ok(current);
            }
        }

        // No usable current session: auto-create the default one
        let id = Uuid::new_v4();
        let now = now_ms();
        index.sessions.insert(
            id,
            SnapshotSession {
                id,
                name: "default".to_string(),
                created: now,
                last_modified: now,
                snapshot_ids: Vec::new(),
                current_id: None,
            },
        );
        index.current_session_id = Some(id);
        Ok(id)
    }

    fn persist(&self, index: &FileStoreIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        atomic_write(&self.cache.files_index_path(), &bytes)
    }
}

/// Write the self-describing `metadata.json` inside a snapshot directory
fn write_snapshot_metadata(dir: &Path, snapshot: &FileSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    atomic_write(&dir.join("metadata.json"), &bytes)
}
