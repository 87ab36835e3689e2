//! Error types for the smcp-sw library.

use thiserror::Error;

use crate::worker::WorkerState;

/// Errors that can occur while handling worker lifecycle and fetch events.
#[derive(Error, Debug)]
pub enum Error {
    /// A network fetch failed before producing a response.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during cache storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Cache storage operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Entry metadata or configuration could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker is not in a state that allows the operation.
    #[error("Invalid worker state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: WorkerState,
        /// State the worker was actually in.
        actual: WorkerState,
    },

    /// Neither the network nor the cache produced a response.
    #[error("No response available for {url}")]
    NoResponse {
        /// URL of the failed request.
        url: String,
    },

    /// An asset was fetched with a non-success status and could not be added.
    #[error("Request for {url} returned status {status}")]
    BadStatus {
        /// URL of the asset.
        url: String,
        /// HTTP status returned.
        status: u16,
    },

    /// An asset resolved to an opaque response and could not be added.
    #[error("Opaque response for {url} cannot be cached")]
    OpaqueResponse {
        /// URL of the asset.
        url: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A specialized `Result` type for smcp-sw operations.
pub type Result<T> = std::result::Result<T, Error>;
