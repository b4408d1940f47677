use reviewpulse_api::GerritError;
use reviewpulse_cache::CacheError;
use thiserror::Error;

/// Everything that can go wrong while producing the trending list
#[derive(Error, Debug)]
pub enum Error {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Cache operation failed: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Malformed change {change}: {reason}")]
    MalformedChange { change: String, reason: String },

    #[error("Refresh superseded by a newer request")]
    Superseded,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<GerritError> for Error {
    fn from(err: GerritError) -> Self {
        match err {
            GerritError::AuthRequired => Error::AuthError(err.to_string()),
            other => Error::ApiError(other.to_string()),
        }
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::CacheError(err.to_string())
    }
}
