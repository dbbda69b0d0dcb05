//! Text areas marked by a nearby flag icon
//!
//! OCR finds the text, then a registered template (the flag) is searched in a
//! window placed relative to each text rectangle. Only texts whose flag is
//! present are kept.

use image::RgbImage;
use tracing::debug;

use super::detection::search_template;
use super::geometry::Rect;
use super::templates::TemplateStore;
use super::TextArea;

/// Text area together with the flag found next to it
#[derive(Debug, Clone, PartialEq)]
pub struct FlagTextArea {
    pub area: TextArea,
    /// Location of the flag in frame coordinates
    pub flag_rect: Rect,
    pub flag_score: f64,
}

/// Keep the areas whose flag window contains `flag_label` with a score of at
/// least `threshold`.
///
/// The window is `area.rect.move_by(flag_offset)` clipped to the frame. An
/// empty `texts` accepts every area. Nothing is returned for an unregistered
/// flag.
pub fn find_flagged<S: AsRef<str>>(
    frame: &RgbImage,
    areas: &[TextArea],
    texts: &[S],
    templates: &TemplateStore,
    flag_label: &str,
    flag_offset: &Rect,
    threshold: f64,
) -> Vec<FlagTextArea> {
    let Some(flag) = templates.lookup(flag_label) else {
        debug!("Flag template '{}' is not registered", flag_label);
        return Vec::new();
    };

    areas
        .iter()
        .filter(|area| texts.is_empty() || texts.iter().any(|t| t.as_ref() == area.text))
        .filter_map(|area| {
            let window = area
                .rect
                .move_by(flag_offset)
                .clip_to(frame.width(), frame.height());
            if window.is_empty() {
                return None;
            }

            let crop = image::imageops::crop_imm(
                frame,
                window.x as u32,
                window.y as u32,
                window.width as u32,
                window.height as u32,
            )
            .to_image();
            let peak = search_template(&crop, flag.image())?;
            let score = peak.score.clamp(0.0, 1.0);

            debug!(
                "Flag '{}' next to '{}' scored {:.3} in {}",
                flag_label, area.text, score, window
            );
            if score < threshold {
                return None;
            }

            Some(FlagTextArea {
                area: area.clone(),
                flag_rect: Rect::new(
                    window.x + peak.position.0 as i32,
                    window.y + peak.position.1 as i32,
                    flag.width() as i32,
                    flag.height() as i32,
                ),
                flag_score: score,
            })
        })
        .collect()
}
