//! Error types for MeetingMirror.
//!
//! Library crates use [`MirrorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all MeetingMirror operations.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The meeting index could not be retrieved or parsed. Aborts the run.
    #[error("catalog error: {message}")]
    CatalogFetch { message: String },

    /// A single artifact (archive, notes, logistics) could not be downloaded.
    #[error("fetch error for {url}: {message}")]
    ArchiveFetch { url: String, message: String },

    /// An archive could not be opened or extracted.
    #[error("corrupt archive {path:?}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the remote site.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or table extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unexpected date format, bad URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    /// Create a catalog error from any displayable message.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::CatalogFetch {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that abort the whole run rather than one meeting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CatalogFetch { .. } | Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MirrorError::config("invalid catalog_url");
        assert_eq!(err.to_string(), "config error: invalid catalog_url");

        let err = MirrorError::ArchiveFetch {
            url: "https://example.org/a.zip".into(),
            message: "HTTP 404 Not Found".into(),
        };
        assert!(err.to_string().contains("a.zip"));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn only_catalog_and_config_errors_are_fatal() {
        assert!(MirrorError::catalog("index unreachable").is_fatal());
        assert!(MirrorError::config("bad url").is_fatal());
        assert!(!MirrorError::Network("reset".into()).is_fatal());
        let io = MirrorError::io("/tmp/x", std::io::Error::other("denied"));
        assert!(!io.is_fatal());
    }
}
