// src/core/errors.rs

//! Defines the primary error type for the entire application.

use thiserror::Error;

/// The main error enum, representing all possible failures within the proxy.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum RampartError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid origin URL '{0}': {1}")]
    OriginUrl(String, String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Cache codec error: {0}")]
    CacheCodec(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),
}

// --- From trait implementations for easy error conversion ---

impl From<reqwest::Error> for RampartError {
    fn from(e: reqwest::Error) -> Self {
        RampartError::Upstream(e.to_string())
    }
}

impl From<redis::RedisError> for RampartError {
    fn from(e: redis::RedisError) -> Self {
        RampartError::CacheBackend(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for RampartError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RampartError::CacheCodec(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RampartError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RampartError::CacheCodec(e.to_string())
    }
}
