//! Error taxonomy for snapshot store operations
//!
//! Errors are returned structurally; a store never partially commits its
//! index on error. The `kind` string is the stable contract surfaced in
//! operation responses.

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the snapshot engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("No active project: operation requires a bound cache directory")]
    NotActivated,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Snapshot corrupt: {0}")]
    Corrupt(String),

    #[error("No usable full snapshot exists to base a restore on")]
    NoBaseline,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Change detection failed on every layer: {0}")]
    ChangeDetectorFailed(String),
}

impl Error {
    /// Stable kind string used in structured responses
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotActivated => "NotActivated",
            Error::InvalidPath(_) => "InvalidPath",
            Error::NotFound(_) => "NotFound",
            Error::Corrupt(_) => "Corrupt",
            Error::NoBaseline => "NoBaseline",
            Error::Io(_) => "IoError",
            // A malformed persisted document is a corruption, not an I/O fault
            Error::Serialization(_) => "Corrupt",
            Error::ChangeDetectorFailed(_) => "ChangeDetectorFailed",
        }
    }

    /// Wrap a guard rejection
    pub fn invalid_path(err: impl std::fmt::Display) -> Self {
        Error::InvalidPath(err.to_string())
    }

    /// Wrap a copier/hasher failure as an I/O error
    pub fn io_other(err: impl std::fmt::Display) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(Error::NotActivated.kind(), "NotActivated");
        assert_eq!(Error::InvalidPath("x".into()).kind(), "InvalidPath");
        assert_eq!(Error::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(Error::Corrupt("x".into()).kind(), "Corrupt");
        assert_eq!(Error::NoBaseline.kind(), "NoBaseline");
        assert_eq!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).kind(),
            "IoError"
        );
        assert_eq!(Error::ChangeDetectorFailed("x".into()).kind(), "ChangeDetectorFailed");
    }

    #[test]
    fn test_io_error_converts() {
        fn read() -> Result<Vec<u8>> {
            Ok(std::fs::read("/definitely/not/here")?)
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }
}
