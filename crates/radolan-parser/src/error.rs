//! Error types for the radolan-parser crate.

use thiserror::Error;

/// Errors that can occur while decoding a radar composite product.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unknown product code: {0:?}")]
    UnknownProduct(String),

    #[error("Header terminator (ETX) never appeared in the byte stream")]
    MissingTerminator,

    #[error("Header too short: need at least {need} bytes, got {got}")]
    TruncatedHeader { need: usize, got: usize },

    #[error("Invalid header field '{field}': {reason}")]
    InvalidHeaderField { field: &'static str, reason: String },

    #[error("Invalid product timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Sample count mismatch: header declares {expected} cells, payload has {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },

    #[error("Payload ends mid-sample: {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Decoder already consumed payload; no further input accepted")]
    DecoderFinished,
}

/// Result type for parser operations.
pub type Result<T> = std::result::Result<T, ParseError>;
