//! Template store: label -> reference image

use image::RgbImage;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::error::{RecognitionError, Result};

/// Decoded reference image registered under a label
#[derive(Debug, Clone)]
pub struct TemplateImage {
    /// Template label
    pub label: String,
    image: RgbImage,
}

impl TemplateImage {
    pub fn new(label: &str, image: RgbImage) -> Self {
        Self {
            label: label.to_string(),
            image,
        }
    }

    /// Load template from an image file
    pub fn from_file(label: &str, path: &Path) -> Result<Self> {
        let image = load_rgb(path)?;
        Ok(Self::new(label, image))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decode an image file into RGB
pub(crate) fn load_rgb(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| RecognitionError::DecodeFailure {
            path: path.to_path_buf(),
            source,
        })
}

/// Registry of reference images keyed by label
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<String, TemplateImage>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path` and store it under `label`, replacing any previous entry
    pub fn register(&mut self, label: &str, path: &Path) -> Result<()> {
        let template = TemplateImage::from_file(label, path)?;
        self.insert(template);
        Ok(())
    }

    /// Store an already decoded image under `label`
    pub fn register_image(&mut self, label: &str, image: RgbImage) {
        self.insert(TemplateImage::new(label, image));
    }

    fn insert(&mut self, template: TemplateImage) {
        info!(
            "Added template '{}' ({}x{})",
            template.label,
            template.width(),
            template.height()
        );
        self.templates.insert(template.label.clone(), template);
    }

    pub fn lookup(&self, label: &str) -> Option<&TemplateImage> {
        self.templates.get(label)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}
