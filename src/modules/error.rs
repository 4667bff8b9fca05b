//! Error taxonomy for context and mount operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by context discovery, record persistence and mount teardown.
///
/// Per-source failures while building a mount are never reported through this
/// type; they are logged and reflected in the returned mount points instead.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The upward walk reached the filesystem root without finding a marker directory.
    #[error("no context found above {}; run `gdctx init` first", .0.display())]
    NoContextFound(PathBuf),

    /// A path expected to be a directory is occupied by something else.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Any filesystem failure not classified above.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path the failing operation was applied to
        path: PathBuf,
        /// Underlying system error
        #[source]
        source: io::Error,
    },

    /// A persisted record does not have the expected shape.
    #[error("malformed record {}: {reason}", .path.display())]
    MalformedRecord {
        /// Path of the offending record
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// A path that cannot be walked as text.
    #[error("path is not valid UTF-8: {}", .0.display())]
    InvalidPath(PathBuf),

    /// No mount record with the given id exists.
    #[error("mount not found: {0}")]
    MountNotFound(String),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ContextError>;

impl ContextError {
    /// Returns a closure wrapping an `io::Error` for `path`, for use with `map_err`.
    pub fn io(path: &Path) -> impl FnOnce(io::Error) -> ContextError {
        let path = path.to_path_buf();
        move |source| ContextError::Io { path, source }
    }

    pub(crate) fn malformed(path: &Path, reason: impl ToString) -> ContextError {
        ContextError::MalformedRecord {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True when this is an I/O failure caused by a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContextError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_path_and_source() {
        let err = ContextError::io(Path::new("/tmp/x"))(io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            format!("I/O error on /tmp/x: {}", io::Error::from(io::ErrorKind::NotFound))
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_malformed_message() {
        let err = ContextError::malformed(Path::new("/r/.gd/indices"), "expected value");
        assert_eq!(err.to_string(), "malformed record /r/.gd/indices: expected value");
        assert!(!err.is_not_found());
    }
}
