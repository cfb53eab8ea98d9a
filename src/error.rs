//! Error types for the optical code scanner

use thiserror::Error;

/// Result type alias for the scanner library
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can occur while scanning, rectifying, validating or rendering
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Region extraction failed: {0}")]
    Preprocessing(String),

    #[error("Rectification failed: {0}")]
    Rectification(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Validation failed for {raw_value:?}: {source}")]
    Validation {
        raw_value: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Display surface unavailable: {0}")]
    Surface(String),

    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn preprocessing<S: Into<String>>(msg: S) -> Self {
        Self::Preprocessing(msg.into())
    }

    pub fn rectification<S: Into<String>>(msg: S) -> Self {
        Self::Rectification(msg.into())
    }

    pub fn recognition<S: Into<String>>(msg: S) -> Self {
        Self::Recognition(msg.into())
    }

    pub fn validation<S: Into<String>>(raw_value: S, source: anyhow::Error) -> Self {
        Self::Validation {
            raw_value: raw_value.into(),
            source,
        }
    }

    pub fn surface<S: Into<String>>(msg: S) -> Self {
        Self::Surface(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        Self::Runtime(msg.into())
    }
}
