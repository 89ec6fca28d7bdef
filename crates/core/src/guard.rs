//! Path validation for everything the engine reads or writes
//!
//! Every file-writing operation goes through [`validate`] before opening its
//! target; restore validates every destination it writes.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Prefixes that snapshot operations must never touch
const PROTECTED_PREFIXES: &[&str] = &[
    "/etc/", "/usr/", "/bin/", "/sbin/", "/boot/", "/root/", "/sys/", "/proc/",
];

/// Validate a path for use as a snapshot source or restore destination
///
/// Rejects paths that:
/// - contain a parent-directory component that cannot be resolved lexically
/// - resolve under an OS-sensitive prefix (`/etc/`, `/usr/`, ...)
/// - when `allowed_root` is given, do not lie within its canonicalised form
///
/// Returns the lexically normalised path on success. The path itself need not
/// exist; `allowed_root` must.
pub fn validate(path: &Path, allowed_root: Option<&Path>) -> Result<PathBuf> {
    let normalized = normalize_lexically(path)?;

    let as_str = normalized.to_string_lossy();
    for prefix in PROTECTED_PREFIXES {
        let bare = prefix.trim_end_matches('/');
        if &*as_str == bare || as_str.starts_with(prefix) {
            anyhow::bail!(
                "Path touches protected prefix {}: {}",
                prefix,
                path.display()
            );
        }
    }

    if let Some(root) = allowed_root {
        let canonical_root = root
            .canonicalize()
            .with_context(|| format!("Failed to canonicalise root: {}", root.display()))?;

        // Relative inputs are anchored at the allowed root before the check
        let absolute = if normalized.is_absolute() {
            normalized.clone()
        } else {
            canonical_root.join(&normalized)
        };

        // Compare against the canonical root; the target itself may not exist
        // yet, so canonicalise its deepest existing ancestor only.
        let resolved = resolve_existing_prefix(&absolute)?;
        if !resolved.starts_with(&canonical_root) {
            anyhow::bail!(
                "Path escapes allowed root {}: {}",
                root.display(),
                path.display()
            );
        }
        return Ok(absolute);
    }

    Ok(normalized)
}

/// Compute the path of `path` relative to `root`, using `/` separators
pub fn relative_to_root(path: &Path, root: &Path) -> Result<String> {
    let normalized = normalize_lexically(path)?;
    let root_normalized = normalize_lexically(root)?;

    let relative = normalized
        .strip_prefix(&root_normalized)
        .map_err(|_| {
            anyhow::anyhow!(
                "Path {} is not under root {}",
                path.display(),
                root.display()
            )
        })?;

    Ok(relative.to_string_lossy().replace('\\', "/"))
}

/// Resolve `.` and `..` components without touching the filesystem
///
/// Fails if a `..` component would climb above the start of the path.
pub fn normalize_lexically(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                depth = 0;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    anyhow::bail!("Path traversal not allowed: {}", path.display());
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }

    Ok(out)
}

/// Canonicalise the deepest existing ancestor of `path`, then re-append the
/// non-existing tail. Used for containment checks on not-yet-created targets.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return Ok(path.to_path_buf()),
        }
    }

    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("Failed to canonicalise: {}", existing.display()))?;
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_relative_path() -> Result<()> {
        let path = validate(Path::new("src/main.rs"), None)?;
        assert_eq!(path, PathBuf::from("src/main.rs"));
        Ok(())
    }

    #[test]
    fn test_normalizes_curdir_and_parent() -> Result<()> {
        let path = validate(Path::new("src/./sub/../main.rs"), None)?;
        assert_eq!(path, PathBuf::from("src/main.rs"));
        Ok(())
    }

    #[test]
    fn test_rejects_traversal_above_start() {
        assert!(validate(Path::new("../secret.txt"), None).is_err());
        assert!(validate(Path::new("a/../../etc/passwd"), None).is_err());
    }

    #[test]
    fn test_rejects_protected_prefixes() {
        for path in [
            "/etc/passwd",
            "/usr/lib/libc.so",
            "/bin/sh",
            "/sbin/init",
            "/boot/vmlinuz",
            "/sys/kernel",
            "/proc/1/mem",
        ] {
            assert!(validate(Path::new(path), None).is_err(), "{} accepted", path);
        }
    }

    #[test]
    fn test_rejects_traversal_into_protected() {
        // Normalisation happens before the prefix check
        assert!(validate(Path::new("/tmp/../etc/passwd"), None).is_err());
    }

    #[test]
    fn test_allowed_root_containment() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        std::fs::create_dir(root.join("sub"))?;

        // Inside the root: ok, including not-yet-existing files
        assert!(validate(&root.join("sub/file.txt"), Some(root)).is_ok());
        assert!(validate(&root.join("new/deep/file.txt"), Some(root)).is_ok());

        // Outside the root: rejected
        let outside = temp.path().parent().unwrap().join("elsewhere.txt");
        assert!(validate(&outside, Some(root)).is_err());
        Ok(())
    }

    #[test]
    fn test_allowed_root_rejects_escape_via_parent() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        assert!(validate(&root.join("sub/../../escape.txt"), Some(root)).is_err());
        Ok(())
    }

    #[test]
    fn test_relative_to_root() -> Result<()> {
        let rel = relative_to_root(Path::new("/work/project/src/lib.rs"), Path::new("/work/project"))?;
        assert_eq!(rel, "src/lib.rs");

        assert!(relative_to_root(Path::new("/other/file.rs"), Path::new("/work/project")).is_err());
        Ok(())
    }
}
