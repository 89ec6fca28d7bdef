//! Exclusion-aware tree walking, copying and mirroring

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Basenames and suffix globs skipped by every scan and copy
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    names: HashSet<String>,
    suffixes: Vec<String>,
}

impl ExcludeSet {
    /// Empty exclusion set (copies everything)
    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
            suffixes: Vec::new(),
        }
    }

    /// Build from explicit basenames and `*.ext`-style globs
    pub fn new(names: &[&str], globs: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            suffixes: globs
                .iter()
                .filter_map(|g| g.strip_prefix('*').map(|s| s.to_string()))
                .collect(),
        }
    }

    /// Add a basename to the set
    pub fn with_name(mut self, name: &str) -> Self {
        self.names.insert(name.to_string());
        self
    }

    /// Whether a directory entry with this basename should be skipped
    pub fn is_excluded(&self, file_name: &str) -> bool {
        if self.names.contains(file_name) {
            return true;
        }
        self.suffixes.iter().any(|s| file_name.ends_with(s.as_str()))
    }
}

impl Default for ExcludeSet {
    /// The standard scan exclusions for project trees
    fn default() -> Self {
        Self::new(
            &[
                ".git",
                "node_modules",
                ".CodeRecoder",
                "__pycache__",
                ".DS_Store",
                "dist",
                "build",
                ".vscode",
                ".idea",
            ],
            &["*.pyc", "*.log"],
        )
    }
}

/// Walk all regular files under `root`, returning root-relative paths
///
/// Entries whose basename matches the exclude set are skipped, directories
/// included (nothing below an excluded directory is visited).
pub fn walk_relative_files(root: &Path, excludes: &ExcludeSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        // The root itself always passes, whatever its name
        if e.depth() == 0 {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !excludes.is_excluded(&name)
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .context("walked entry not under root")?;
            files.push(relative.to_path_buf());
        }
    }

    Ok(files)
}

/// Copy a single file, creating the destination's parent directories
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent: {}", parent.display()))?;
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dst.display()))
}

/// Recursively mirror `src` into `dst`, honouring the exclude set
///
/// Destination directories are created as needed; existing destination files
/// are overwritten, never deleted. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, excludes: &ExcludeSet) -> Result<u64> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create destination: {}", dst.display()))?;

    let mut copied = 0u64;
    for relative in walk_relative_files(src, excludes)? {
        copy_file(&src.join(&relative), &dst.join(&relative))?;
        copied += 1;
    }
    Ok(copied)
}

/// Mirror `src` into `dst` using the platform copy tool where available
///
/// Tries `cp -R` per top-level entry (exclusions are applied at the top
/// level, which is where the engine's own bookkeeping lives); any spawn
/// failure or non-zero exit falls back to the in-process recursive copy.
/// The fallback is load-bearing: correctness never depends on an external
/// tool being installed. Never deletes destination files.
pub fn mirror_tree(src: &Path, dst: &Path, excludes: &ExcludeSet) -> Result<()> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create destination: {}", dst.display()))?;

    if native_mirror(src, dst, excludes).is_ok() {
        return Ok(());
    }

    tracing::debug!(
        "Native mirror unavailable, copying {} in-process",
        src.display()
    );
    copy_tree(src, dst, excludes)?;
    Ok(())
}

/// Per-entry `cp -R` mirror; any failure aborts so the caller can fall back
#[cfg(unix)]
fn native_mirror(src: &Path, dst: &Path, excludes: &ExcludeSet) -> Result<()> {
    use std::process::Command;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if excludes.is_excluded(&name.to_string_lossy()) {
            continue;
        }

        let target = dst.join(&name);
        let status = if entry.file_type()?.is_dir() {
            // Copy contents into the target; `cp -R dir target` would nest
            // the directory when the target already exists
            std::fs::create_dir_all(&target)?;
            Command::new("cp")
                .arg("-R")
                .arg(format!("{}/.", entry.path().display()))
                .arg(&target)
                .status()
        } else {
            Command::new("cp").arg(entry.path()).arg(&target).status()
        };

        let status = status.context("Failed to spawn cp")?;
        if !status.success() {
            anyhow::bail!("cp exited with {}", status);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn native_mirror(_src: &Path, _dst: &Path, _excludes: &ExcludeSet) -> Result<()> {
    anyhow::bail!("no native mirror tool on this platform")
}
