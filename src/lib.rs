//! UiVision - visual recognition of UI elements in screen frames
//!
//! Locates registered elements by template matching, keypoint features or
//! OCR text, with a position cache for elements that stay put.

pub mod config;
pub mod vision;

pub use config::RecognizerConfig;
pub use vision::{
    AlgorithmKind, FlagTextArea, MatchResult, RecognitionError, Recognizer, Rect, TextArea,
    TextRecognizer,
};
