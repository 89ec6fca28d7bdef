//! CodeRecoder core - filesystem primitives for the snapshot engine
//!
//! This crate provides the foundational layer:
//! - SHA-256 content hashing and cheap stat fingerprints
//! - Path validation against traversal and OS-sensitive prefixes
//! - Exclusion-aware tree walking, copying and mirroring

pub mod copier;
pub mod guard;
pub mod hash;

// Re-export main types for convenience
pub use copier::{copy_file, copy_tree, mirror_tree, walk_relative_files, ExcludeSet};
pub use guard::{relative_to_root, validate};
pub use hash::{
    digest_file, fingerprint, hash_bytes, hash_file, FileDigest, Fingerprint, IncrementalHasher,
    Sha256Hash,
};

/// Common result type used throughout recoder-core
pub type Result<T> = anyhow::Result<T>;
