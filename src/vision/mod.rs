//! Vision Layer
//!
//! Locates UI elements in captured frames. Supports three strategies:
//! - Template matching with a histogram-verified position cache
//! - Keypoint feature matching for elements that change scale or background
//! - OCR text lookup through a pluggable text engine

pub mod cache;
pub mod color;
pub mod detection;
pub mod error;
pub mod feature_match;
pub mod features;
pub mod flag_text;
pub mod geometry;
pub mod models;
pub mod ocr;
pub mod ransac;
pub mod recognizer;
pub mod templates;

pub use error::{RecognitionError, Result};
pub use feature_match::{FeatureFilterParams, FeatureMatcher};
pub use features::{FeatureDescriptorSet, FeatureExtractor, FeatureExtractorConfig, FeatureStore};
pub use flag_text::FlagTextArea;
pub use geometry::Rect;
pub use models::{OcrModelFile, OcrModels};
pub use ocr::TextRecognizer;
pub use recognizer::Recognizer;
pub use templates::{TemplateImage, TemplateStore};

/// How a template lookup produced its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Label not registered; nothing was searched
    JustReturn,
    /// Cached position re-verified by histogram comparison
    CompareHist,
    /// Full correlation search over the frame
    MatchTemplate,
}

/// Outcome of a template lookup
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchResult {
    pub kind: AlgorithmKind,
    /// Similarity in [0, 1]
    pub score: f64,
    /// Matched region, shrunk toward its center
    pub rect: Rect,
}

impl MatchResult {
    /// Result for a label with nothing registered
    pub fn just_return() -> Self {
        Self {
            kind: AlgorithmKind::JustReturn,
            score: 0.0,
            rect: Rect::default(),
        }
    }
}

/// Labelled rectangle: an OCR text or a feature-matched element
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextArea {
    pub text: String,
    pub rect: Rect,
}

impl TextArea {
    pub fn new(text: &str, rect: Rect) -> Self {
        Self {
            text: text.to_string(),
            rect,
        }
    }

    /// Build from an OCR box given as top-left, top-right, bottom-right,
    /// bottom-left corners
    pub fn from_quad(text: &str, quad: &[(i32, i32); 4]) -> Self {
        let [top_left, top_right, _, bottom_left] = *quad;
        Self::new(
            text,
            Rect::new(
                top_left.0,
                top_left.1,
                top_right.0 - top_left.0,
                bottom_left.1 - top_left.1,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_return_is_empty() {
        let result = MatchResult::just_return();
        assert_eq!(result.kind, AlgorithmKind::JustReturn);
        assert_eq!(result.score, 0.0);
        assert!(result.rect.is_empty());
    }

    #[test]
    fn test_text_area_from_quad() {
        let area = TextArea::from_quad("Start", &[(10, 20), (70, 21), (71, 38), (11, 36)]);
        assert_eq!(area.text, "Start");
        assert_eq!(area.rect, Rect::new(10, 20, 60, 16));
    }

    #[test]
    fn test_degenerate_quad_clamps() {
        let area = TextArea::from_quad("x", &[(10, 20), (5, 20), (5, 10), (10, 10)]);
        assert_eq!(area.rect, Rect::new(10, 20, 0, 0));
    }
}
