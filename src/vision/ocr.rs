//! OCR backend boundary
//!
//! Text detection and recognition run in an external engine. The recognizer
//! only needs its output: recognized strings with their bounding boxes, in the
//! order the engine reports them.

use image::RgbImage;

use super::error::Result;
use super::geometry::Rect;
use super::models::OcrModels;
use super::TextArea;

/// Text engine producing recognized areas for a frame
pub trait TextRecognizer: Send + Sync {
    /// Load models from a validated model directory
    fn init_models(&mut self, models: &OcrModels) -> Result<()>;

    /// Worker threads the engine may use for inference
    fn set_num_threads(&mut self, threads: usize);

    /// Recognize every text area in `frame`
    fn recognize(&self, frame: &RgbImage) -> Result<Vec<TextArea>>;
}

/// Rect of the first area whose text equals `label`
pub fn first_text(areas: &[TextArea], label: &str) -> Option<Rect> {
    areas.iter().find(|area| area.text == label).map(|area| area.rect)
}

/// Areas whose text is one of `labels`, in engine order.
///
/// Each area appears at most once even if `labels` repeats a string.
pub fn select_texts<S: AsRef<str>>(areas: &[TextArea], labels: &[S]) -> Vec<TextArea> {
    areas
        .iter()
        .filter(|area| labels.iter().any(|label| label.as_ref() == area.text))
        .cloned()
        .collect()
}
