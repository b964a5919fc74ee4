//! Error types for stanza operations.
//!
//! Errors are categorized so callers can decide how far a failure reaches:
//! a single line, a single stanza, a single file or a single request. Nothing
//! in this crate is fatal to a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors, used to pick the recovery boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// File missing, unreadable or not writable
    Io,
    /// A line that could not be understood
    Parse,
    /// A key/value line outside of any stanza
    OrphanKey,
    /// A `disabled` value that is neither true nor false
    MalformedDisposition,
    /// Transport level failure while dispatching
    Network,
    /// Bad configuration input
    Config,
}

impl ErrorCategory {
    /// Whether the error only affects the line it was found on.
    pub fn is_line_local(&self) -> bool {
        matches!(self, Self::Parse | Self::OrphanKey)
    }

    /// What happens to the work item that produced this error.
    pub fn recovery(&self) -> &'static str {
        match self {
            Self::Io => "file skipped",
            Self::Parse | Self::OrphanKey => "line skipped",
            Self::MalformedDisposition => "stanza skipped",
            Self::Network => "request counted as failed",
            Self::Config => "default used",
        }
    }
}

/// Errors that can occur while reading, resolving or dispatching stanzas.
#[derive(Debug, Error)]
pub enum Error {
    /// File could not be read or written
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A line that is neither a comment, a header nor a key/value pair
    #[error("unparseable line {line}: {content}")]
    Parse {
        /// Line number (1-indexed)
        line: usize,
        /// Trimmed line content
        content: String,
    },

    /// A key/value line before the first stanza header
    #[error("key '{key}' on line {line} is outside of any stanza")]
    OrphanKey {
        /// Line number (1-indexed)
        line: usize,
        /// Key that was found
        key: String,
    },

    /// A `disabled` value that cannot be read as a boolean
    #[error("stanza '{stanza}' has invalid disabled value '{value}'")]
    MalformedDisposition {
        /// Stanza the value belongs to
        stanza: String,
        /// Raw value
        value: String,
    },

    /// Transport failure for one request
    #[error("network error for {url}: {message}")]
    Network {
        /// Full request URL
        url: String,
        /// Detailed error message
        message: String,
    },

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io { .. } => ErrorCategory::Io,
            Error::Parse { .. } => ErrorCategory::Parse,
            Error::OrphanKey { .. } => ErrorCategory::OrphanKey,
            Error::MalformedDisposition { .. } => ErrorCategory::MalformedDisposition,
            Error::Network { .. } => ErrorCategory::Network,
            Error::Config(_) => ErrorCategory::Config,
        }
    }

    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for stanza operations.
pub type Result<T> = std::result::Result<T, Error>;
