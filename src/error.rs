// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned HTTP {0}")]
    Status(u16),

    #[error("Provider error: {0}")]
    Provider(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
