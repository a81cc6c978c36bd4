//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The settings file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not JSON, or a value has the wrong shape.
    #[error("invalid settings in {}: {source}", path.display())]
    Invalid {
        /// The settings file.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The compiled defaults failed to round-trip through JSON.
    #[error("settings defaults: {0}")]
    Defaults(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
