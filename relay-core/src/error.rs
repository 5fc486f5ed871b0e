//! Error types for relay-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or saving the relay's YAML files.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the file involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file did not exist at the expected path.
    #[error("file not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A loaded file is well-formed YAML but inconsistent.
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
}

/// Errors surfaced by a [`crate::store::Store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend rejected or failed an operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
