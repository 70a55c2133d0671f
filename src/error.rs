//! # Error Handling
//!
//! Error taxonomy for tile extraction runs, with classification helpers used
//! by the batch session to decide what aborts a run and what is skipped.
//!
//! ## Propagation Policy
//!
//! | Category | Raised when | Handling |
//! |----------|-------------|----------|
//! | `config` | tile size, scale or scorer invalid | fatal, before any work starts |
//! | `decode` | a source file is unreadable or corrupt | image skipped, batch continues |
//! | `inference` | scorer backend fails (device memory, tensor shape) | image skipped |
//! | `io` | a tile cannot be written | image skipped |
//! | `worker` | a process-mode child dies or answers garbage | image skipped |
//! | `search` | field resampling fails | image skipped |
//!
//! An exhausted score field is not an error: it yields zero tiles.
//!
//! ## Usage
//!
//! ```rust
//! use complexity_tiler::error::{TileError, Recoverable};
//!
//! let error = TileError::config("tile_size", "0", "must be greater than 0")
//!     .with_context("validating command line");
//!
//! assert!(error.is_fatal());
//! assert!(!error.is_recoverable());
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Affects one image; the run continues
    Error,
    /// Aborts the whole run
    Fatal,
}

/// Base error type for tile extraction.
#[derive(Debug, Error)]
pub enum TileError {
    /// Configuration validation errors
    #[error("Configuration error in '{field}': {reason} (value: {value})")]
    InvalidConfiguration {
        field: String,
        value: String,
        reason: String,
        context: Option<String>,
    },
    /// Source image unreadable or corrupt
    #[error("Failed to decode '{}': {source}", .path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
        context: Option<String>,
    },
    /// Scorer backend failure
    #[error("Scorer '{scorer}' failed: {reason}")]
    ScorerInference {
        scorer: String,
        reason: String,
        context: Option<String>,
    },
    /// I/O errors
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
        context: Option<String>,
    },
    /// Process-mode worker failures
    #[error("Worker for '{}' failed: {reason}", .image.display())]
    Worker {
        image: PathBuf,
        reason: String,
        context: Option<String>,
    },
    /// Tile search failures
    #[error("Tile search failed: {source}")]
    Search {
        #[source]
        source: tile_search::SearchError,
        context: Option<String>,
    },
}

impl TileError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: None,
        }
    }

    /// Create a decode error for `path`
    pub fn decode(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::ImageDecode {
            path: path.as_ref().to_path_buf(),
            source,
            context: None,
        }
    }

    /// Create a scorer inference error
    pub fn inference(scorer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScorerInference {
            scorer: scorer.into(),
            reason: reason.into(),
            context: None,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: None,
        }
    }

    /// Create an I/O error tied to a path
    pub fn io_at(
        operation: impl Into<String>,
        path: impl AsRef<Path>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().to_path_buf()),
            source,
            context: None,
        }
    }

    /// Create a worker error
    pub fn worker(image: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Worker {
            image: image.as_ref().to_path_buf(),
            reason: reason.into(),
            context: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        *self.context_mut() = Some(context.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::InvalidConfiguration { context, .. }
            | Self::ImageDecode { context, .. }
            | Self::ScorerInference { context, .. }
            | Self::Io { context, .. }
            | Self::Worker { context, .. }
            | Self::Search { context, .. } => context.as_deref(),
        }
    }

    fn context_mut(&mut self) -> &mut Option<String> {
        match self {
            Self::InvalidConfiguration { context, .. }
            | Self::ImageDecode { context, .. }
            | Self::ScorerInference { context, .. }
            | Self::Io { context, .. }
            | Self::Worker { context, .. }
            | Self::Search { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "config",
            Self::ImageDecode { .. } => "decode",
            Self::ScorerInference { .. } => "inference",
            Self::Io { .. } => "io",
            Self::Worker { .. } => "worker",
            Self::Search { .. } => "search",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidConfiguration { .. } => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Error,
        }
    }

    /// Only configuration errors stop a run.
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

/// Result type alias using our custom error type
pub type TileResult<T> = Result<T, TileError>;

/// Trait for errors that can be recovered from by skipping the current unit of work
pub trait Recoverable {
    /// Check if this error can be recovered from
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for TileError {
    fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<tile_search::SearchError> for TileError {
    fn from(source: tile_search::SearchError) -> Self {
        Self::Search {
            source,
            context: None,
        }
    }
}

impl From<std::io::Error> for TileError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}
