//! Error types for arl-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for arl-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for arl-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed locator or malformed auth payload
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Method is not one of the known transports
    #[error("Method not supported: {0}")]
    UnsupportedMethod(String),

    /// Auth kind is not legal for the method
    #[error("Auth type not supported: {0}")]
    UnsupportedAuth(String),

    /// Remote answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Resource is larger than the configured ceiling
    #[error("Maximum resource size reached: limit is {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    /// Payload looks like an archive but cannot be read as one
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// A single work item ran past its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration file or option error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::Syntax(_)
            | Error::UnsupportedMethod(_)
            | Error::UnsupportedAuth(_)
            | Error::Config(_)
            | Error::InvalidUrl(_) => 2, // UsageError
            Error::Network(_) | Error::Timeout(_) => 3, // NetworkError
            Error::HttpStatus { status, .. } => match *status {
                401 | 403 => 4, // AuthError
                404 => 5,       // NotFound
                _ => 3,
            },
            Error::NotFound(_) => 5,
            Error::SizeLimitExceeded { .. } => 6,
            Error::CorruptArchive(_) => 7,
            _ => 1, // GeneralError
        }
    }
}
