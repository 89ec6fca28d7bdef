//! Per-store serialisation of write operations
//!
//! Each store owns one `LockManager`; writes are chained behind a keyed
//! mutex rather than OS file locks. All index writes use [`SAVE_DATA`].

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Lock key guarding the on-disk index of a store
pub const SAVE_DATA: &str = "save_data";

/// Keyed in-process mutexes providing single-writer serialisation per store
///
/// A failing operation releases its lock normally and never poisons the
/// chain (parking_lot mutexes do not poison).
#[derive(Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the lock for `key`
    pub fn with_lock<T>(&self, key: &str, op: impl FnOnce() -> crate::Result<T>) -> crate::Result<T> {
        let handle = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _guard = handle.lock();
        op()
    }
}
