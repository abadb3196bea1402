//! Error handling module
//!
//! None of these errors cross the public `configure`/`event`/`view`/`cleanup`
//! boundary; they are logged there and dropped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("browser host unavailable: {0}")]
    HostUnavailable(&'static str),
    #[error("host call failed: {0}")]
    Host(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("url cannot carry a host or path: {0}")]
    OpaqueUrl(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid path pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn host(message: impl Into<String>) -> Self {
        TrackerError::Host(message.into())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
