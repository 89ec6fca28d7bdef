//! CodeRecoder snapshot stores and change detection
//!
//! This crate provides:
//! - The `.CodeRecoder/` cache directory layout
//! - File-level snapshots grouped into sessions
//! - Project-level full/incremental snapshot chains with an on-disk index
//! - The change detector deciding what a snapshot must contain
//! - The restore planner resolving a target into a replayable chain
//! - Per-store write serialisation via the lock manager

pub mod baseline;
pub mod detect;
pub mod error;
pub mod file_store;
pub mod layout;
pub mod lock;
pub mod planner;
pub mod project_store;

// Re-exports
pub use baseline::{BaselineMap, FileBaseline};
pub use detect::{detect_changes, Detection};
pub use error::{Error, Result};
pub use file_store::{FileSnapshot, FileSnapshotStore, RestoredFile, SnapshotSession};
pub use layout::{CacheDir, ProjectConfig, CACHE_DIR_NAME};
pub use lock::{LockManager, SAVE_DATA};
pub use planner::plan_chain;
pub use project_store::{
    ProjectRestore, ProjectSnapshot, ProjectSnapshotInfo, ProjectStore, SnapshotKind,
    StoreSettings, FULL_SENTINEL,
};
