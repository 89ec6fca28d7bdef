//! Change detection: decide what a project snapshot must contain
//!
//! Layered fallback, first non-empty layer wins:
//! 1. VCS status porcelain (authoritative when present)
//! 2. Content hash against the baseline map (catches edits invisible to stat)
//! 3. Stat walk (cheap for the common save-file case; discovers new files)
//! 4. Recently-modified window - forward-progress fallback, consulted only
//!    when an earlier layer errored rather than merely coming back empty
//!
//! A completely empty baseline means first-ever snapshot: detection is
//! skipped, everything is captured and the baseline is initialised from the
//! walk.

use crate::baseline::{BaselineMap, FileBaseline};
use crate::{Error, Result};
use recoder_core::copier::{self, ExcludeSet};
use recoder_core::hash;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default recency window for the layer-4 fallback (1 hour)
pub const DEFAULT_RECENT_WINDOW_SECS: u64 = 3600;

/// Outcome of a detection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Baseline was empty: snapshot everything, baselines now initialised
    InitialScan(Vec<String>),
    /// Root-relative paths whose content may differ from the baseline
    Changes(Vec<String>),
}

/// Run the fallback chain against the live tree
///
/// Layers 2 and 3 refresh matching baseline entries in place; the caller
/// decides when the mutated map is persisted.
pub fn detect_changes(
    project_root: &Path,
    baselines: &mut BaselineMap,
    excludes: &ExcludeSet,
    recent_window_secs: u64,
) -> Result<Detection> {
    if baselines.is_empty() {
        let all = initial_scan(project_root, baselines, excludes)?;
        return Ok(Detection::InitialScan(all));
    }

    let mut layer_errors: Vec<String> = Vec::new();

    match vcs_status(project_root) {
        Ok(paths) if !paths.is_empty() => return Ok(Detection::Changes(paths)),
        Ok(_) => {}
        Err(err) => {
            tracing::warn!("VCS status layer failed: {err}");
            layer_errors.push(format!("vcs: {err}"));
        }
    }

    match hash_layer(project_root, baselines) {
        Ok(paths) if !paths.is_empty() => return Ok(Detection::Changes(paths)),
        Ok(_) => {}
        Err(err) => {
            tracing::warn!("Hash comparison layer failed: {err}");
            layer_errors.push(format!("hash: {err}"));
        }
    }

    match stat_layer(project_root, baselines, excludes) {
        Ok(paths) if !paths.is_empty() => return Ok(Detection::Changes(paths)),
        Ok(_) => {}
        Err(err) => {
            tracing::warn!("Stat comparison layer failed: {err}");
            layer_errors.push(format!("stat: {err}"));
        }
    }

    // Every prior layer ran clean and found nothing: the tree matches the
    // baseline. The recency walk exists to make progress when the machinery
    // above is broken, not to re-report files that already match.
    if layer_errors.is_empty() {
        return Ok(Detection::Changes(Vec::new()));
    }

    match recent_layer(project_root, excludes, recent_window_secs) {
        Ok(paths) => Ok(Detection::Changes(paths)),
        Err(err) => {
            tracing::warn!("Recency fallback layer failed: {err}");
            layer_errors.push(format!("recent: {err}"));
            Err(Error::ChangeDetectorFailed(layer_errors.join("; ")))
        }
    }
}

/// Capture every file and build the baseline map from scratch
fn initial_scan(
    project_root: &Path,
    baselines: &mut BaselineMap,
    excludes: &ExcludeSet,
) -> Result<Vec<String>> {
    let mut all = Vec::new();
    for relative in
        copier::walk_relative_files(project_root, excludes).map_err(Error::io_other)?
    {
        let key = rel_key(&relative.to_string_lossy());
        match FileBaseline::capture(&project_root.join(&relative)) {
            Ok(baseline) => {
                baselines.insert(key.clone(), baseline);
                all.push(key);
            }
            Err(err) => {
                // A file vanishing mid-scan is not fatal to the snapshot
                tracing::warn!("Skipping unbaselinable file {key}: {err}");
            }
        }
    }
    Ok(all)
}

/// Layer 1: ask the version-control tool
///
/// An absent tool or non-zero exit is treated as an empty result.
fn vcs_status(project_root: &Path) -> Result<Vec<String>> {
    let output = match Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(project_root)
        .output()
    {
        Ok(out) => out,
        Err(err) => {
            tracing::debug!("git unavailable: {err}");
            return Ok(Vec::new());
        }
    };

    if !output.status.success() {
        return Ok(Vec::new());
    }

    Ok(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `git status --porcelain` output into relative paths
fn parse_porcelain(stdout: &str) -> Vec<String> {
    let mut paths = BTreeSet::new();

    for line in stdout.lines() {
        if line.len() < 4 {
            continue;
        }
        // Two-character status, one space, then the path
        let mut path = &line[3..];
        // Renames are reported as "old -> new"; the new side is live
        if let Some((_, renamed)) = path.split_once(" -> ") {
            path = renamed;
        }
        let path = path.trim().trim_matches('"');
        if path.is_empty() || path.starts_with(crate::layout::CACHE_DIR_NAME) {
            continue;
        }
        paths.insert(rel_key(path));
    }

    paths.into_iter().collect()
}

/// Layer 2: hash every baselined file, flag and refresh mismatches
fn hash_layer(project_root: &Path, baselines: &mut BaselineMap) -> Result<Vec<String>> {
    let mut changed = BTreeSet::new();

    let keys: Vec<String> = baselines.keys().cloned().collect();
    for key in keys {
        let path = project_root.join(&key);
        if !path.is_file() {
            continue;
        }
        let digest = hash::digest_file(&path).map_err(Error::io_other)?;
        let hex = digest.hash.to_hex();

        let entry = baselines.get_mut(&key).expect("key taken from map");
        if entry.content_hash != hex {
            let fp = hash::fingerprint(&path).map_err(Error::io_other)?;
            entry.size = digest.size;
            entry.mtime_ms = fp.mtime_ms;
            entry.content_hash = hex;
            entry.line_count = Some(digest.lines);
            changed.insert(key);
        }
    }

    Ok(changed.into_iter().collect())
}

/// Layer 3: stat walk; new files and size/mtime drift
fn stat_layer(
    project_root: &Path,
    baselines: &mut BaselineMap,
    excludes: &ExcludeSet,
) -> Result<Vec<String>> {
    let mut changed = BTreeSet::new();

    for relative in
        copier::walk_relative_files(project_root, excludes).map_err(Error::io_other)?
    {
        let key = rel_key(&relative.to_string_lossy());
        let path = project_root.join(&relative);

        match baselines.get(&key) {
            None => {
                let baseline = FileBaseline::capture(&path)?;
                baselines.insert(key.clone(), baseline);
                changed.insert(key);
            }
            Some(existing) => {
                let fp = hash::fingerprint(&path).map_err(Error::io_other)?;
                if !existing.matches_fingerprint(&fp) {
                    let baseline = FileBaseline::capture(&path)?;
                    baselines.insert(key.clone(), baseline);
                    changed.insert(key);
                }
            }
        }
    }

    Ok(changed.into_iter().collect())
}

/// Layer 4: everything modified within the recency window
fn recent_layer(
    project_root: &Path,
    excludes: &ExcludeSet,
    window_secs: u64,
) -> Result<Vec<String>> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let cutoff_ms = now_ms.saturating_sub(window_secs * 1000);

    let mut recent = BTreeSet::new();
    for relative in
        copier::walk_relative_files(project_root, excludes).map_err(Error::io_other)?
    {
        let path = project_root.join(&relative);
        let fp = hash::fingerprint(&path).map_err(Error::io_other)?;
        if fp.mtime_ms >= cutoff_ms {
            recent.insert(rel_key(&relative.to_string_lossy()));
        }
    }

    Ok(recent.into_iter().collect())
}

/// Normalise a relative path into the baseline key form
fn rel_key(path: &str) -> String {
    path.trim_start_matches("./").replace('\\', "/")
}
