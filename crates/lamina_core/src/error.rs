//! Core error types

use thiserror::Error;

/// Errors raised while building views or loading configuration
#[derive(Error, Debug)]
pub enum Error {
    /// A view snapshot violates its invariants
    #[error("Invalid view: {0}")]
    InvalidView(String),

    /// Failed to read a configuration file
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected shape
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds an unusable value
    #[error("Invalid config value: {0}")]
    ConfigValue(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
