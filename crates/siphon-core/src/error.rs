//! Error types for siphon-core

use thiserror::Error;

/// Result type alias for siphon-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in siphon-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// A `{group.sources.*.key}` reference points at something that
    /// does not exist in the source-group configuration
    #[error("reference '{reference}' not found: {message} (available: {available})")]
    ReferenceNotFound {
        /// The raw reference text
        reference: String,
        /// What was missing (group, source, or key)
        message: String,
        /// Comma-separated names that do exist at the failing level
        available: String,
    },

    /// No schema snapshot is available for a table
    #[error("no schema available for table '{table}': {message}")]
    SchemaUnavailable {
        /// Table reference that was looked up
        table: String,
        /// Description of the failure
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
