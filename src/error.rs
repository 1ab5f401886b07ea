//! Crate-wide error types.

use thiserror::Error;

pub type ReqprofResult<T> = Result<T, ReqprofError>;

#[derive(Debug, Error)]
pub enum ReqprofError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("report error: {0}")]
    Report(String),
}
