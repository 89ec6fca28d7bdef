//! Project-level snapshot store: incremental/full chains over the whole tree
//!
//! Snapshots are materialised under `snapshots/projects/<id>/`, recorded in a
//! single `index.json` document together with the baselines the change
//! detector runs against. Writes are serialised through the store's lock
//! manager and the index is never partially committed on error.

use crate::baseline::{BaselineMap, FileBaseline};
use crate::detect::{self, Detection};
use crate::layout::{atomic_write, now_ms, CacheDir};
use crate::lock::{LockManager, SAVE_DATA};
use crate::planner;
use crate::{Error, Result};
use parking_lot::RwLock;
use recoder_core::copier::{self, ExcludeSet};
use recoder_core::guard;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Marker used as the whole `changed_files` list of a full snapshot
pub const FULL_SENTINEL: &str = "*";

/// Snapshot materialisation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Full,
    Incremental,
}

/// Bookkeeping recorded with every project snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub project_root: PathBuf,
    /// Regular files physically written under the snapshot directory,
    /// excluding the metadata document itself
    pub actual_file_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// One project snapshot record; immutable once materialised
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub id: Uuid,
    /// Creation time (Unix milliseconds)
    pub timestamp: u64,
    /// Monotonic, contiguous from 1 within the store
    pub save_number: u64,
    pub kind: SnapshotKind,
    /// Root-relative changed paths, or `["*"]` for full snapshots
    pub changed_files: Vec<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub metadata: SnapshotMetadata,
}

impl ProjectSnapshot {
    /// Fulls and forced `["*"]` snapshots both replay as self-contained trees
    pub fn restores_as_full(&self) -> bool {
        self.kind == SnapshotKind::Full
            || self.changed_files.iter().any(|f| f == FULL_SENTINEL)
    }
}

/// Tunables persisted inside the index document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Snapshots kept before retention trims the oldest
    pub retention_cap: usize,
    pub auto_cleanup: bool,
    /// Window for the change detector's recency fallback
    pub recent_window_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            retention_cap: 50,
            auto_cleanup: true,
            recent_window_secs: detect::DEFAULT_RECENT_WINDOW_SECS,
        }
    }
}

fn default_full_save_interval() -> u64 {
    10
}

/// The persistent index document (`snapshots/projects/index.json`)
///
/// Older documents without `fileBaselines` or `lastScanTime` load with
/// empty/zero defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStoreState {
    pub project_root: PathBuf,
    pub current_save_number: u64,
    pub last_full_save_number: u64,
    #[serde(default = "default_full_save_interval")]
    pub full_save_interval: u64,
    #[serde(default)]
    pub snapshots: Vec<ProjectSnapshot>,
    #[serde(default)]
    pub file_baselines: BaselineMap,
    #[serde(default)]
    pub last_scan_time: u64,
    #[serde(default)]
    pub settings: StoreSettings,
}

impl ProjectStoreState {
    fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            current_save_number: 0,
            last_full_save_number: 0,
            full_save_interval: default_full_save_interval(),
            snapshots: Vec::new(),
            file_baselines: BaselineMap::new(),
            last_scan_time: 0,
            settings: StoreSettings::default(),
        }
    }
}

/// One row of `list_snapshots` output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshotInfo {
    pub id: Uuid,
    pub save_number: u64,
    pub kind: SnapshotKind,
    pub timestamp: u64,
    pub time_since: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub changed_files: Vec<String>,
    /// Save numbers the planner would replay to restore this snapshot
    pub dependencies: Vec<u64>,
    pub estimated_size_bytes: u64,
    pub restorability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Result of a chain restore
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRestore {
    pub save_number: u64,
    pub kind: SnapshotKind,
    pub chain: Vec<u64>,
    pub files_restored: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

/// The project snapshot store bound to one cache directory
pub struct ProjectStore {
    cache: CacheDir,
    excludes: ExcludeSet,
    locks: LockManager,
    state: RwLock<ProjectStoreState>,
}

impl ProjectStore {
    /// Bind the store, loading the index if one exists
    pub fn bind(cache: CacheDir) -> Result<Self> {
        let index_path = cache.projects_index_path();
        let state = if index_path.is_file() {
            serde_json::from_slice(&std::fs::read(&index_path)?)?
        } else {
            ProjectStoreState::new(cache.project_root().to_path_buf())
        };

        Ok(Self {
            cache,
            excludes: ExcludeSet::default(),
            locks: LockManager::new(),
            state: RwLock::new(state),
        })
    }

    /// Capture a snapshot of the whole project
    ///
    /// The change detector decides what it must contain; the interval policy
    /// decides full vs incremental. An explicit request against an unchanged
    /// tree is honoured with a forced full (`changed_files = ["*"]`).
    pub fn create_snapshot(
        &self,
        prompt: &str,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Result<ProjectSnapshot> {
        self.locks.with_lock(SAVE_DATA, || {
            let mut state = self.state.write();
            let next = state.current_save_number + 1;
            let root = self.cache.project_root().to_path_buf();

            // Detection mutates a working copy; the store's baselines only
            // move when the snapshot commits.
            let mut baselines = state.file_baselines.clone();
            let detection = match detect::detect_changes(
                &root,
                &mut baselines,
                &self.excludes,
                state.settings.recent_window_secs,
            ) {
                Ok(detection) => detection,
                Err(err) => {
                    // The scan timestamp moves on every call, failed or not
                    state.last_scan_time = now_ms();
                    if let Err(persist_err) = self.persist(&state) {
                        tracing::warn!(
                            "Failed to persist scan timestamp after detector failure: {persist_err}"
                        );
                    }
                    return Err(err);
                }
            };

            let no_history = state.snapshots.is_empty();
            let (kind, changed_files) = match detection {
                Detection::InitialScan(_) => {
                    (SnapshotKind::Full, vec![FULL_SENTINEL.to_string()])
                }
                Detection::Changes(paths) if paths.is_empty() => {
                    // The caller explicitly asked; materialise a forced full
                    tracing::info!("No changes detected, forcing a full snapshot");
                    (SnapshotKind::Full, vec![FULL_SENTINEL.to_string()])
                }
                Detection::Changes(paths) => {
                    // Whichever layer reported them, the baselines must end
                    // up tracking the captured state (the VCS layer never
                    // touches the map itself)
                    for path in &paths {
                        let source = root.join(path);
                        if !source.is_file() {
                            continue;
                        }
                        match FileBaseline::capture(&source) {
                            Ok(baseline) => {
                                baselines.insert(path.clone(), baseline);
                            }
                            Err(err) => {
                                tracing::warn!("Baseline refresh failed for {path}: {err}")
                            }
                        }
                    }

                    let interval_reached =
                        next - state.last_full_save_number >= state.full_save_interval;
                    if interval_reached || no_history {
                        (SnapshotKind::Full, vec![FULL_SENTINEL.to_string()])
                    } else {
                        (SnapshotKind::Incremental, paths)
                    }
                }
            };

            let id = Uuid::new_v4();
            let snapshot_dir = self.cache.project_snapshot_dir(id);
            // Partial files are left in place for inspection on error; the
            // index is only written after materialisation succeeds.
            self.materialise(kind, &changed_files, &root, &snapshot_dir)?;

            let actual_file_count = count_payload_files(&snapshot_dir);
            let (branch, commit) = git_head_info(&root);

            let snapshot = ProjectSnapshot {
                id,
                timestamp: now_ms(),
                save_number: next,
                kind,
                changed_files,
                prompt: prompt.to_string(),
                name,
                tags,
                analysis: None,
                metadata: SnapshotMetadata {
                    project_root: root,
                    actual_file_count,
                    branch,
                    commit,
                },
            };

            let bytes = serde_json::to_vec_pretty(&snapshot)?;
            atomic_write(&snapshot_dir.join("snapshot_metadata.json"), &bytes)?;

            state.current_save_number = next;
            if kind == SnapshotKind::Full {
                state.last_full_save_number = next;
            }
            state.snapshots.push(snapshot.clone());
            state.file_baselines = baselines;
            state.last_scan_time = now_ms();
            self.persist(&state)?;

            self.apply_retention(&mut state)?;

            tracing::info!(
                snapshot = %id,
                save_number = next,
                kind = ?kind,
                files = actual_file_count,
                "project snapshot created"
            );
            Ok(snapshot)
        })
    }

    fn materialise(
        &self,
        kind: SnapshotKind,
        changed_files: &[String],
        root: &Path,
        snapshot_dir: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(snapshot_dir)?;

        match kind {
            SnapshotKind::Full => {
                copier::copy_tree(root, snapshot_dir, &self.excludes)
                    .map_err(Error::io_other)?;
            }
            SnapshotKind::Incremental => {
                for relative in changed_files {
                    let source = root.join(relative);
                    if !source.is_file() {
                        // Detected then deleted before capture; not fatal
                        tracing::warn!("Changed file vanished before capture: {relative}");
                        continue;
                    }
                    copier::copy_file(&source, &snapshot_dir.join(relative))
                        .map_err(Error::io_other)?;
                }
            }
        }
        Ok(())
    }

    /// List snapshots newest-first, annotated for display
    ///
    /// A broken snapshot never prevents listing the others; it is annotated
    /// instead.
    pub fn list_snapshots(&self) -> Vec<ProjectSnapshotInfo> {
        let state = self.state.read();
        let mut infos: Vec<ProjectSnapshotInfo> = state
            .snapshots
            .iter()
            .map(|snapshot| self.annotate(&state, snapshot))
            .collect();
        infos.sort_by(|a, b| b.save_number.cmp(&a.save_number));
        infos
    }

    fn annotate(
        &self,
        state: &ProjectStoreState,
        snapshot: &ProjectSnapshot,
    ) -> ProjectSnapshotInfo {
        let dir = self.cache.project_snapshot_dir(snapshot.id);
        let probe = |s: &ProjectSnapshot| dir_has_payload(&self.cache.project_snapshot_dir(s.id));

        let (dependencies, problem) =
            match planner::plan_chain(&state.snapshots, snapshot, &probe) {
                Ok(chain) => (chain.iter().map(|s| s.save_number).collect(), None),
                Err(err) => (Vec::new(), Some(err.to_string())),
            };

        let restorability = if snapshot.restores_as_full() {
            "directly restorable"
        } else {
            "chained restore required"
        };

        ProjectSnapshotInfo {
            id: snapshot.id,
            save_number: snapshot.save_number,
            kind: snapshot.kind,
            timestamp: snapshot.timestamp,
            time_since: format_relative_time(snapshot.timestamp),
            prompt: snapshot.prompt.clone(),
            name: snapshot.name.clone(),
            tags: snapshot.tags.clone(),
            changed_files: snapshot.changed_files.clone(),
            dependencies,
            estimated_size_bytes: estimate_dir_size(&dir),
            restorability: restorability.to_string(),
            problem,
        }
    }

    /// Restore the working tree to a snapshot by replaying its chain
    ///
    /// Never deletes files outside the snapshot payload: full snapshots are
    /// mirrored over the tree without any destructive sync, incrementals are
    /// copied file by file.
    pub fn restore_snapshot(&self, snapshot_id: Uuid) -> Result<ProjectRestore> {
        self.locks.with_lock(SAVE_DATA, || {
            let mut state = self.state.write();
            let target = state
                .snapshots
                .iter()
                .find(|s| s.id == snapshot_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Project snapshot {snapshot_id}")))?;

            let probe =
                |s: &ProjectSnapshot| dir_has_payload(&self.cache.project_snapshot_dir(s.id));
            let chain: Vec<ProjectSnapshot> =
                planner::plan_chain(&state.snapshots, &target, &probe)?
                    .into_iter()
                    .cloned()
                    .collect();

            let root = self.cache.project_root().to_path_buf();
            let mut files_restored = 0u64;
            let mut skipped_files = Vec::new();

            for element in &chain {
                let snapshot_dir = self.cache.project_snapshot_dir(element.id);
                if element.restores_as_full() {
                    files_restored +=
                        self.restore_full(&snapshot_dir, &root).map_err(|err| {
                            tracing::error!(
                                save_number = element.save_number,
                                "full restore failed: {err}"
                            );
                            err
                        })?;
                } else {
                    for relative in &element.changed_files {
                        let source = snapshot_dir.join(relative);
                        if !source.is_file() {
                            tracing::warn!(
                                save_number = element.save_number,
                                "entry missing from snapshot payload: {relative}"
                            );
                            skipped_files.push(relative.clone());
                            continue;
                        }
                        let destination = guard::validate(&root.join(relative), Some(&root))
                            .map_err(Error::invalid_path)?;
                        copier::copy_file(&source, &destination).map_err(Error::io_other)?;
                        files_restored += 1;
                    }
                }
            }

            // The tree now reflects the chain; re-anchor the baselines so the
            // next snapshot sees exactly the post-restore state.
            let mut rebuilt = BaselineMap::new();
            for relative in copier::walk_relative_files(&root, &self.excludes)
                .map_err(Error::io_other)?
            {
                let key = relative.to_string_lossy().replace('\\', "/");
                match FileBaseline::capture(&root.join(&relative)) {
                    Ok(baseline) => {
                        rebuilt.insert(key, baseline);
                    }
                    Err(err) => tracing::warn!("Skipping unbaselinable file {key}: {err}"),
                }
            }
            state.file_baselines = rebuilt;
            state.last_scan_time = now_ms();
            self.persist(&state)?;

            tracing::info!(
                save_number = target.save_number,
                chain = ?chain.iter().map(|s| s.save_number).collect::<Vec<_>>(),
                files = files_restored,
                "project snapshot restored"
            );
            Ok(ProjectRestore {
                save_number: target.save_number,
                kind: target.kind,
                chain: chain.iter().map(|s| s.save_number).collect(),
                files_restored,
                skipped_files,
            })
        })
    }

    /// Mirror a full snapshot directory back over the project root
    fn restore_full(&self, snapshot_dir: &Path, root: &Path) -> Result<u64> {
        // The engine's own bookkeeping is never clobbered by a restore
        let excludes = ExcludeSet::empty()
            .with_name(crate::layout::CACHE_DIR_NAME)
            .with_name("snapshot_metadata.json");

        let restored = count_payload_files(snapshot_dir);
        copier::mirror_tree(snapshot_dir, root, &excludes).map_err(Error::io_other)?;
        Ok(restored)
    }

    /// Trim the oldest snapshots past the retention cap
    fn apply_retention(&self, state: &mut ProjectStoreState) -> Result<()> {
        let cap = state.settings.retention_cap;
        if !state.settings.auto_cleanup || state.snapshots.len() <= cap {
            return Ok(());
        }

        // Creation order is monotonic, so oldest-by-timestamp and
        // lowest-save-number coincide.
        let mut by_age: Vec<(u64, Uuid)> = state
            .snapshots
            .iter()
            .map(|s| (s.timestamp, s.id))
            .collect();
        by_age.sort();

        let excess = state.snapshots.len() - cap;
        let doomed: Vec<Uuid> = by_age.into_iter().take(excess).map(|(_, id)| id).collect();

        for id in &doomed {
            let dir = self.cache.project_snapshot_dir(*id);
            if dir.exists() {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    // One stubborn directory does not stop the sweep
                    tracing::warn!("Failed to remove reaped snapshot {id}: {err}");
                }
            }
            tracing::info!(snapshot = %id, "snapshot reaped by retention");
        }
        state.snapshots.retain(|s| !doomed.contains(&s.id));
        self.persist(state)
    }

    /// Snapshot records, oldest first (test and listing support)
    pub fn snapshots(&self) -> Vec<ProjectSnapshot> {
        self.state.read().snapshots.clone()
    }

    /// Current baseline map (test support)
    pub fn baselines(&self) -> BaselineMap {
        self.state.read().file_baselines.clone()
    }

    /// Look up a snapshot by save number
    pub fn find_by_save_number(&self, save_number: u64) -> Option<ProjectSnapshot> {
        self.state
            .read()
            .snapshots
            .iter()
            .find(|s| s.save_number == save_number)
            .cloned()
    }

    /// Adjust the full-save interval (tests and configuration glue)
    pub fn set_full_save_interval(&self, interval: u64) {
        self.state.write().full_save_interval = interval.max(1);
    }

    /// Adjust retention settings (tests and configuration glue)
    pub fn set_retention(&self, cap: usize, auto_cleanup: bool) {
        let mut state = self.state.write();
        state.settings.retention_cap = cap;
        state.settings.auto_cleanup = auto_cleanup;
    }

    fn persist(&self, state: &ProjectStoreState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        atomic_write(&self.cache.projects_index_path(), &bytes)
    }
}

/// Whether a snapshot directory holds restorable content: at least one
/// regular file with actual bytes, not counting the metadata document
pub(crate) fn dir_has_payload(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_type().is_file()
                && e.file_name() != "snapshot_metadata.json"
                && e.metadata().map(|m| m.len() > 0).unwrap_or(false)
        })
}

/// Count regular files under a snapshot directory, excluding the metadata
fn count_payload_files(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() != "snapshot_metadata.json")
        .count() as u64
}

/// Recursive directory size; 0 for missing directories
fn estimate_dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Read branch and commit from `.git` without shelling out
fn git_head_info(root: &Path) -> (Option<String>, Option<String>) {
    let head_path = root.join(".git/HEAD");
    let head = match std::fs::read_to_string(&head_path) {
        Ok(contents) => contents.trim().to_string(),
        Err(_) => return (None, None),
    };

    if let Some(reference) = head.strip_prefix("ref: ") {
        let branch = reference.strip_prefix("refs/heads/").map(|b| b.to_string());
        let commit = std::fs::read_to_string(root.join(".git").join(reference))
            .ok()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        (branch, commit)
    } else if head.len() >= 40 {
        // Detached HEAD holds the commit hash directly
        (None, Some(head))
    } else {
        (None, None)
    }
}

/// Format a timestamp as relative time ("2 hours ago")
fn format_relative_time(ts_ms: u64) -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let datetime = UNIX_EPOCH + Duration::from_millis(ts_ms);
    if let Ok(elapsed) = SystemTime::now().duration_since(datetime) {
        let seconds = elapsed.as_secs();
        if seconds < 60 {
            format!("{} seconds ago", seconds)
        } else if seconds < 3600 {
            format!("{} minutes ago", seconds / 60)
        } else if seconds < 86400 {
            format!("{} hours ago", seconds / 3600)
        } else if seconds < 604800 {
            format!("{} days ago", seconds / 86400)
        } else {
            format!("{} weeks ago", seconds / 604800)
        }
    } else {
        "in the future".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn store(temp: &TempDir) -> ProjectStore {
        let cache = CacheDir::init(temp.path(), None, None).unwrap();
        ProjectStore::bind(cache).unwrap()
    }

    #[test]
    fn test_first_snapshot_is_full() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        let snapshot = store.create_snapshot("init", None, Vec::new())?;

        assert_eq!(snapshot.save_number, 1);
        assert_eq!(snapshot.kind, SnapshotKind::Full);
        assert_eq!(snapshot.changed_files, vec![FULL_SENTINEL.to_string()]);
        assert_eq!(snapshot.metadata.actual_file_count, 1);

        let dir = store.cache.project_snapshot_dir(snapshot.id);
        assert_eq!(std::fs::read_to_string(dir.join("a.txt"))?, "hello");
        assert!(dir.join("snapshot_metadata.json").exists());
        Ok(())
    }

    #[test]
    fn test_second_snapshot_is_incremental() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        store.create_snapshot("init", None, Vec::new())?;

        write(temp.path(), "a.txt", "world!");
        let second = store.create_snapshot("edit", None, Vec::new())?;

        assert_eq!(second.save_number, 2);
        assert_eq!(second.kind, SnapshotKind::Incremental);
        assert_eq!(second.changed_files, vec!["a.txt".to_string()]);
        assert_eq!(second.metadata.actual_file_count, 1);
        Ok(())
    }

    #[test]
    fn test_forced_snapshot_on_unchanged_tree() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        store.create_snapshot("init", None, Vec::new())?;
        let forced = store.create_snapshot("nothing changed", None, Vec::new())?;

        assert_eq!(forced.save_number, 2);
        assert_eq!(forced.changed_files, vec![FULL_SENTINEL.to_string()]);
        assert!(forced.restores_as_full());
        Ok(())
    }

    #[test]
    fn test_full_interval_rolls_over() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "f.txt", "0");

        let store = store(&temp);
        store.set_full_save_interval(3);

        for i in 1..=7 {
            write(temp.path(), "f.txt", &i.to_string());
            store.create_snapshot(&format!("edit {i}"), None, Vec::new())?;
        }

        let kinds: Vec<SnapshotKind> =
            store.snapshots().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SnapshotKind::Full,        // 1: first ever
                SnapshotKind::Incremental, // 2
                SnapshotKind::Incremental, // 3
                SnapshotKind::Full,        // 4: interval reached
                SnapshotKind::Incremental, // 5
                SnapshotKind::Incremental, // 6
                SnapshotKind::Full,        // 7: interval reached
            ]
        );
        Ok(())
    }

    #[test]
    fn test_save_numbers_contiguous() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "f.txt", "0");

        let store = store(&temp);
        for i in 1..=5 {
            write(temp.path(), "f.txt", &i.to_string());
            store.create_snapshot("edit", None, Vec::new())?;
        }

        let numbers: Vec<u64> = store.snapshots().iter().map(|s| s.save_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_restore_roundtrip() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        let first = store.create_snapshot("init", None, Vec::new())?;

        write(temp.path(), "a.txt", "world");
        store.create_snapshot("edit", None, Vec::new())?;

        let restore = store.restore_snapshot(first.id)?;
        assert_eq!(restore.save_number, 1);
        assert_eq!(std::fs::read_to_string(temp.path().join("a.txt"))?, "hello");
        Ok(())
    }

    #[test]
    fn test_restore_never_deletes_untracked() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        let first = store.create_snapshot("init", None, Vec::new())?;

        // A file created after the snapshot must survive a full restore
        write(temp.path(), "untracked.txt", "precious");
        store.restore_snapshot(first.id)?;

        assert_eq!(
            std::fs::read_to_string(temp.path().join("untracked.txt"))?,
            "precious"
        );
        Ok(())
    }

    #[test]
    fn test_restore_after_restore_is_idempotent() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");
        write(temp.path(), "src/b.rs", "fn b() {}");

        let store = store(&temp);
        let first = store.create_snapshot("init", None, Vec::new())?;

        write(temp.path(), "a.txt", "changed");
        store.create_snapshot("edit", None, Vec::new())?;

        store.restore_snapshot(first.id)?;
        let after_first: Vec<u8> = std::fs::read(temp.path().join("a.txt"))?;
        store.restore_snapshot(first.id)?;
        let after_second: Vec<u8> = std::fs::read(temp.path().join("a.txt"))?;

        assert_eq!(after_first, after_second);
        assert_eq!(after_second, b"hello");
        Ok(())
    }

    #[test]
    fn test_restore_then_create_sees_no_content_change() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "state one");

        let store = store(&temp);
        let first = store.create_snapshot("one", None, Vec::new())?;

        store.restore_snapshot(first.id)?;
        let followup = store.create_snapshot("roundtrip", None, Vec::new())?;

        // The tree equals the restored chain state, so the only possible
        // outcome is a forced full with no real changes behind it.
        assert_eq!(followup.changed_files, vec![FULL_SENTINEL.to_string()]);
        Ok(())
    }

    #[test]
    fn test_restore_unknown_id() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.txt", "x");
        let store = store(&temp);
        let result = store.restore_snapshot(Uuid::new_v4());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_retention_trims_oldest() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "f.txt", "0");

        let store = store(&temp);
        store.set_retention(3, true);

        let mut ids = Vec::new();
        for i in 1..=5 {
            write(temp.path(), "f.txt", &i.to_string());
            ids.push(store.create_snapshot("edit", None, Vec::new())?.id);
        }

        let remaining = store.snapshots();
        assert_eq!(remaining.len(), 3);
        let numbers: Vec<u64> = remaining.iter().map(|s| s.save_number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);

        // Reaped payload directories are gone
        assert!(!store.cache.project_snapshot_dir(ids[0]).exists());
        assert!(!store.cache.project_snapshot_dir(ids[1]).exists());
        assert!(store.cache.project_snapshot_dir(ids[4]).exists());
        Ok(())
    }

    #[test]
    fn test_retention_disabled_keeps_everything() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "f.txt", "0");

        let store = store(&temp);
        store.set_retention(2, false);

        for i in 1..=4 {
            write(temp.path(), "f.txt", &i.to_string());
            store.create_snapshot("edit", None, Vec::new())?;
        }
        assert_eq!(store.snapshots().len(), 4);
        Ok(())
    }

    #[test]
    fn test_listing_annotations() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        store.create_snapshot("init", None, Vec::new())?;
        write(temp.path(), "a.txt", "more");
        store.create_snapshot("edit", None, vec!["wip".to_string()])?;

        let listing = store.list_snapshots();
        assert_eq!(listing.len(), 2);

        // Newest first
        assert_eq!(listing[0].save_number, 2);
        assert_eq!(listing[0].restorability, "chained restore required");
        assert_eq!(listing[0].dependencies, vec![1, 2]);
        assert_eq!(listing[0].tags, vec!["wip".to_string()]);
        assert!(listing[0].estimated_size_bytes > 0);

        assert_eq!(listing[1].save_number, 1);
        assert_eq!(listing[1].restorability, "directly restorable");
        assert_eq!(listing[1].dependencies, vec![1]);
        Ok(())
    }

    #[test]
    fn test_index_backward_compat_missing_baselines() -> Result<()> {
        let temp = TempDir::new()?;
        write(temp.path(), "a.txt", "hello");

        let store = store(&temp);
        store.create_snapshot("init", None, Vec::new())?;
        let index_path = store.cache.projects_index_path();
        drop(store);

        // Strip the baseline bookkeeping, as an old index document would lack it
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&index_path)?)?;
        doc.as_object_mut().unwrap().remove("fileBaselines");
        doc.as_object_mut().unwrap().remove("lastScanTime");
        std::fs::write(&index_path, serde_json::to_vec_pretty(&doc)?)?;

        let cache = CacheDir::open(temp.path())?;
        let reopened = ProjectStore::bind(cache)?;
        assert!(reopened.baselines().is_empty());

        // Next snapshot rebuilds the baseline from scratch
        let rebuilt = reopened.create_snapshot("rebuild", None, Vec::new())?;
        assert_eq!(rebuilt.changed_files, vec![FULL_SENTINEL.to_string()]);
        assert!(reopened.baselines().contains_key("a.txt"));

        // And the one after sees a stable tree
        let clean = reopened.create_snapshot("clean", None, Vec::new())?;
        assert_eq!(clean.changed_files, vec![FULL_SENTINEL.to_string()]);
        Ok(())
    }

    #[test]
    fn test_git_head_info_reads_branch_and_commit() -> Result<()> {
        let temp = TempDir::new()?;
        write(
            temp.path(),
            ".git/HEAD",
            "ref: refs/heads/feature/snapshots\n",
        );
        write(
            temp.path(),
            ".git/refs/heads/feature/snapshots",
            "0123456789abcdef0123456789abcdef01234567\n",
        );

        let (branch, commit) = git_head_info(temp.path());
        assert_eq!(branch.as_deref(), Some("feature/snapshots"));
        assert_eq!(
            commit.as_deref(),
            Some("0123456789abcdef0123456789abcdef01234567")
        );
        Ok(())
    }

    #[test]
    fn test_format_relative_time_buckets() {
        let now = now_ms();
        assert!(format_relative_time(now).contains("seconds ago"));
        assert!(format_relative_time(now - 5 * 60 * 1000).contains("minutes ago"));
        assert!(format_relative_time(now - 3 * 3600 * 1000).contains("hours ago"));
        assert!(format_relative_time(now - 2 * 86400 * 1000).contains("days ago"));
    }
}
