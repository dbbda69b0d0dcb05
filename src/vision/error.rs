//! Error types for the recognition engine
//!
//! Only configuration and I/O problems are errors. "Not registered" and
//! "not found" outcomes are returned as values by the matchers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Reference image missing or undecodable at registration time
    #[error("failed to decode image {path:?}: {source}")]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// OCR model directory is incomplete
    #[error("OCR model directory {dir:?} is missing: {}", missing.join(", "))]
    ModelFilesMissing {
        dir: PathBuf,
        missing: Vec<&'static str>,
    },

    /// Text query issued before the OCR backend was initialized
    #[error("OCR backend is not initialized")]
    OcrNotReady,

    /// Failure reported by the OCR backend itself
    #[error("OCR backend error: {0}")]
    Ocr(String),
}

pub type Result<T> = std::result::Result<T, RecognitionError>;
