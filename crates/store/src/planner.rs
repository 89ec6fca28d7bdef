//! Restore planning: resolve a target snapshot into the chain to replay
//!
//! A full snapshot supersedes any earlier base for reconstructing later
//! state, so the chain always starts at the nearest usable full and replays
//! forward to the target.

use crate::project_store::ProjectSnapshot;
use crate::{Error, Result};

/// Resolve the ordered chain of snapshots that reconstructs `target`
///
/// `has_payload` probes whether a snapshot's directory still holds
/// restorable content. The target itself must have payload; other chain
/// elements without payload are skipped with a warning. If no full below
/// the target is usable, all fulls are scanned newest-first as a degraded
/// recovery; with no usable full at all the plan fails with `NoBaseline`.
pub fn plan_chain<'a>(
    snapshots: &'a [ProjectSnapshot],
    target: &'a ProjectSnapshot,
    has_payload: &dyn Fn(&ProjectSnapshot) -> bool,
) -> Result<Vec<&'a ProjectSnapshot>> {
    if !has_payload(target) {
        return Err(Error::Corrupt(format!(
            "Snapshot {} (save {}) has no restorable payload",
            target.id, target.save_number
        )));
    }

    if target.restores_as_full() {
        return Ok(vec![target]);
    }

    // Nearest usable full strictly below the target
    let base = snapshots
        .iter()
        .filter(|s| {
            s.restores_as_full() && s.save_number < target.save_number && has_payload(s)
        })
        .max_by_key(|s| s.save_number);

    let base = match base {
        Some(base) => base,
        None => {
            // Degraded recovery: any usable full, newest first
            let fallback = snapshots
                .iter()
                .filter(|s| s.restores_as_full() && has_payload(s))
                .max_by_key(|s| s.save_number);
            match fallback {
                Some(base) => {
                    tracing::warn!(
                        base = base.save_number,
                        target = target.save_number,
                        "no full snapshot below target; degraded recovery from newest usable full"
                    );
                    base
                }
                None => return Err(Error::NoBaseline),
            }
        }
    };

    if base.save_number > target.save_number {
        return Ok(vec![base, target]);
    }

    let mut range: Vec<&ProjectSnapshot> = snapshots
        .iter()
        .filter(|s| s.save_number > base.save_number && s.save_number <= target.save_number)
        .collect();
    range.sort_by_key(|s| s.save_number);

    let mut chain: Vec<&ProjectSnapshot> = vec![base];
    for snapshot in range {
        if snapshot.restores_as_full() {
            if has_payload(snapshot) {
                // A later full is a cheaper baseline; restart the chain there
                chain = vec![snapshot];
            } else {
                tracing::warn!(
                    save_number = snapshot.save_number,
                    "skipping full snapshot with no payload"
                );
            }
            continue;
        }
        if has_payload(snapshot) {
            chain.push(snapshot);
        } else if snapshot.save_number != target.save_number {
            tracing::warn!(
                save_number = snapshot.save_number,
                "skipping incremental snapshot with no payload"
            );
        }
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project_store::{SnapshotKind, SnapshotMetadata, FULL_SENTINEL};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn snapshot(save_number: u64, kind: SnapshotKind) -> ProjectSnapshot {
        let changed_files = match kind {
            SnapshotKind::Full => vec![FULL_SENTINEL.to_string()],
            SnapshotKind::Incremental => vec![format!("file{save_number}.txt")],
        };
        ProjectSnapshot {
            id: Uuid::new_v4(),
            timestamp: 1_700_000_000_000 + save_number,
            save_number,
            kind,
            changed_files,
            prompt: format!("snapshot {save_number}"),
            name: None,
            tags: Vec::new(),
            analysis: None,
            metadata: SnapshotMetadata {
                project_root: PathBuf::from("/project"),
                actual_file_count: 1,
                branch: None,
                commit: None,
            },
        }
    }

    /// Interval-3 history: fulls at 1, 4, 7
    fn history() -> Vec<ProjectSnapshot> {
        vec![
            snapshot(1, SnapshotKind::Full),
            snapshot(2, SnapshotKind::Incremental),
            snapshot(3, SnapshotKind::Incremental),
            snapshot(4, SnapshotKind::Full),
            snapshot(5, SnapshotKind::Incremental),
            snapshot(6, SnapshotKind::Incremental),
            snapshot(7, SnapshotKind::Full),
        ]
    }

    fn saves(chain: &[&ProjectSnapshot]) -> Vec<u64> {
        chain.iter().map(|s| s.save_number).collect()
    }

    #[test]
    fn test_full_target_is_its_own_chain() {
        let history = history();
        let chain = plan_chain(&history, &history[3], &|_| true).unwrap();
        assert_eq!(saves(&chain), vec![4]);
    }

    #[test]
    fn test_incremental_chains_from_nearest_full() {
        let history = history();
        let chain = plan_chain(&history, &history[5], &|_| true).unwrap();
        assert_eq!(saves(&chain), vec![4, 5, 6]);
    }

    #[test]
    fn test_chain_is_contiguous_and_ends_at_target() {
        let history = history();
        for target in history.iter().filter(|s| s.kind == SnapshotKind::Incremental) {
            let chain = plan_chain(&history, target, &|_| true).unwrap();
            let numbers = saves(&chain);

            assert!(chain[0].restores_as_full());
            assert!(chain[0].save_number <= target.save_number);
            assert_eq!(*numbers.last().unwrap(), target.save_number);
            for pair in numbers.windows(2) {
                assert_eq!(pair[1], pair[0] + 1, "chain has a gap: {:?}", numbers);
            }
        }
    }

    #[test]
    fn test_empty_incremental_is_skipped() {
        let history = history();
        let empty: HashSet<u64> = [5].into_iter().collect();
        let probe = |s: &ProjectSnapshot| !empty.contains(&s.save_number);

        let chain = plan_chain(&history, &history[5], &probe).unwrap();
        assert_eq!(saves(&chain), vec![4, 6]);
    }

    #[test]
    fn test_corrupt_target_fails() {
        let history = history();
        let empty: HashSet<u64> = [5].into_iter().collect();
        let probe = |s: &ProjectSnapshot| !empty.contains(&s.save_number);

        let result = plan_chain(&history, &history[4], &probe);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_degraded_recovery_uses_other_full() {
        let history = history();
        // Fulls at 1 and 4 are gone; target 5 falls back to the full at 7
        let empty: HashSet<u64> = [1, 4].into_iter().collect();
        let probe = |s: &ProjectSnapshot| !empty.contains(&s.save_number);

        let chain = plan_chain(&history, &history[4], &probe).unwrap();
        assert_eq!(saves(&chain), vec![7, 5]);
    }

    #[test]
    fn test_no_usable_full_is_no_baseline() {
        let history: Vec<ProjectSnapshot> = vec![
            snapshot(1, SnapshotKind::Full),
            snapshot(2, SnapshotKind::Incremental),
        ];
        // The only full has no payload
        let probe = |s: &ProjectSnapshot| s.kind == SnapshotKind::Incremental;

        let result = plan_chain(&history, &history[1], &probe);
        assert!(matches!(result, Err(Error::NoBaseline)));
    }

    #[test]
    fn test_later_full_resets_chain() {
        // Forced full at 3 inside the replay range supersedes the base at 1
        let history = vec![
            snapshot(1, SnapshotKind::Full),
            snapshot(2, SnapshotKind::Incremental),
            {
                let mut forced = snapshot(3, SnapshotKind::Incremental);
                forced.changed_files = vec![FULL_SENTINEL.to_string()];
                forced
            },
            snapshot(4, SnapshotKind::Incremental),
            snapshot(5, SnapshotKind::Incremental),
        ];

        let chain = plan_chain(&history, &history[4], &|_| true).unwrap();
        assert_eq!(saves(&chain), vec![3, 4, 5]);
    }

    #[test]
    fn test_forced_sentinel_restores_as_full() {
        let mut forced = snapshot(9, SnapshotKind::Incremental);
        forced.changed_files = vec![FULL_SENTINEL.to_string()];
        assert!(forced.restores_as_full());

        let history = vec![forced];
        let chain = plan_chain(&history, &history[0], &|_| true).unwrap();
        assert_eq!(saves(&chain), vec![9]);
    }
}
