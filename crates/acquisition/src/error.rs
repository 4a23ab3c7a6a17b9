//! Error types for the acquisition crate.

use thiserror::Error;

/// Errors that can occur while acquiring and preparing radar products.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Download failed for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("No download endpoint for product {0}")]
    UnsupportedStream(radolan_parser::Product),

    #[error("Decompression failed: {0}")]
    Decompression(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Failed to parse product: {0}")]
    Parse(#[from] radolan_parser::ParseError),

    #[error("Unknown observation type: {0}")]
    UnknownObservation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquireError>;
