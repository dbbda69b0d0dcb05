//! Recognition facade
//!
//! Owns the reference stores, the position cache and the optional OCR engine,
//! and exposes every lookup over a single frame. Registration needs `&mut
//! self`; queries only borrow, so a configured recognizer can be shared across
//! threads.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::RecognizerConfig;

use super::cache::PositionCache;
use super::detection::TemplateMatcher;
use super::error::{RecognitionError, Result};
use super::feature_match::FeatureMatcher;
use super::features::{FeatureExtractor, FeatureStore};
use super::flag_text::{find_flagged, FlagTextArea};
use super::geometry::Rect;
use super::models::OcrModels;
use super::ocr::{first_text, select_texts, TextRecognizer};
use super::templates::TemplateStore;
use super::{MatchResult, TextArea};

/// Visual recognizer for UI elements
pub struct Recognizer {
    templates: TemplateStore,
    features: FeatureStore,
    extractor: FeatureExtractor,
    cache: PositionCache,
    template_matcher: TemplateMatcher,
    feature_matcher: FeatureMatcher,
    confirm_threshold: f64,
    text_engine: Option<Box<dyn TextRecognizer>>,
    ocr_ready: bool,
    ocr_threads: usize,
    ocr_model_dir: Option<PathBuf>,
}

impl Recognizer {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            templates: TemplateStore::new(),
            features: FeatureStore::new(),
            extractor: FeatureExtractor::new(config.features.extractor_config()),
            cache: PositionCache::new(),
            template_matcher: TemplateMatcher::new(config.template.matcher_config()),
            feature_matcher: FeatureMatcher::new(
                config.features.single_params(),
                config.features.scan_all_params(),
                config.features.ransac_config(),
            ),
            confirm_threshold: config.template.confirm_threshold,
            text_engine: None,
            ocr_ready: false,
            ocr_threads: config.ocr.threads,
            ocr_model_dir: config.ocr.model_dir.clone(),
        }
    }

    /// Attach the OCR engine used by text lookups
    pub fn with_text_recognizer(mut self, engine: Box<dyn TextRecognizer>) -> Self {
        self.set_text_recognizer(engine);
        self
    }

    /// Replace the OCR engine; models must be initialized again
    pub fn set_text_recognizer(&mut self, mut engine: Box<dyn TextRecognizer>) {
        engine.set_num_threads(self.ocr_threads);
        self.text_engine = Some(engine);
        self.ocr_ready = false;
    }

    /// Register a reference image for template matching
    pub fn register_template(&mut self, label: &str, path: &Path) -> bool {
        match self.templates.register(label, path) {
            Ok(()) => true,
            Err(e) => {
                error!("Template '{}' not registered: {}", label, e);
                false
            }
        }
    }

    pub fn register_template_image(&mut self, label: &str, image: RgbImage) {
        self.templates.register_image(label, image);
    }

    /// Register a reference image for feature matching
    pub fn register_feature(&mut self, label: &str, path: &Path) -> bool {
        match self.features.register(label, path, &self.extractor) {
            Ok(()) => true,
            Err(e) => {
                error!("Feature set '{}' not registered: {}", label, e);
                false
            }
        }
    }

    pub fn register_feature_image(&mut self, label: &str, image: &RgbImage) {
        self.features.register_image(label, image, &self.extractor);
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Every registered label (templates and feature sets), sorted, no repeats
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .templates
            .labels()
            .chain(self.features.iter().map(|(label, _)| label))
            .map(str::to_string)
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// Locate a template using the configured confirmation threshold
    pub fn locate(&self, frame: &RgbImage, label: &str) -> MatchResult {
        self.locate_with_threshold(frame, label, self.confirm_threshold)
    }

    /// Locate a template; a full search scoring at least `threshold` is cached
    pub fn locate_with_threshold(&self, frame: &RgbImage, label: &str, threshold: f64) -> MatchResult {
        self.template_matcher
            .locate(frame, &self.templates, &self.cache, label, threshold)
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        info!("Position cache {}", if enabled { "enabled" } else { "disabled" });
        self.cache.set_enabled(enabled);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Locate one registered feature set in `frame`
    pub fn locate_by_feature(&self, frame: &RgbImage, label: &str) -> Option<TextArea> {
        if self.features.get(label).is_none() {
            debug!("Feature set '{}' is not registered", label);
            return None;
        }
        let scene = self.extractor.extract_rgb(frame);
        self.feature_matcher.locate(&scene, &self.features, label)
    }

    /// Every registered feature set found in `frame`, in label order
    pub fn locate_all_by_feature(&self, frame: &RgbImage) -> Vec<TextArea> {
        if self.features.is_empty() {
            return Vec::new();
        }
        let scene = self.extractor.extract_rgb(frame);
        self.feature_matcher.locate_all(&scene, &self.features)
    }

    /// Validate the model directory and load it into the OCR engine
    pub fn init_ocr_models(&mut self, dir: &Path) -> bool {
        let models = match OcrModels::from_dir(dir) {
            Ok(models) => models,
            Err(e) => {
                error!("OCR models not loaded: {}", e);
                return false;
            }
        };

        let Some(engine) = self.text_engine.as_mut() else {
            warn!("No OCR engine attached, cannot load {:?}", dir);
            return false;
        };

        engine.set_num_threads(self.ocr_threads);
        match engine.init_models(&models) {
            Ok(()) => {
                info!("OCR ready ({} threads)", self.ocr_threads);
                self.ocr_ready = true;
                true
            }
            Err(e) => {
                error!("OCR engine failed to load models: {}", e);
                false
            }
        }
    }

    /// Load models from the directory named in the config
    pub fn init_configured_ocr_models(&mut self) -> bool {
        match self.ocr_model_dir.clone() {
            Some(dir) => self.init_ocr_models(&dir),
            None => {
                warn!("No OCR model directory configured");
                false
            }
        }
    }

    /// Thread count for OCR inference
    pub fn set_ocr_threads(&mut self, threads: usize) {
        self.ocr_threads = threads.max(1);
        if let Some(engine) = self.text_engine.as_mut() {
            engine.set_num_threads(self.ocr_threads);
        }
    }

    pub fn ocr_threads(&self) -> usize {
        self.ocr_threads
    }

    pub fn is_ocr_ready(&self) -> bool {
        self.ocr_ready
    }

    fn recognize_text(&self, frame: &RgbImage) -> Result<Vec<TextArea>> {
        match self.text_engine.as_deref() {
            Some(engine) if self.ocr_ready => {
                let areas = engine.recognize(frame)?;
                debug!("OCR found {} text areas", areas.len());
                Ok(areas)
            }
            _ => Err(RecognitionError::OcrNotReady),
        }
    }

    /// Rect of the first recognized text equal to `label`
    pub fn find_text(&self, frame: &RgbImage, label: &str) -> Result<Option<Rect>> {
        let areas = self.recognize_text(frame)?;
        Ok(first_text(&areas, label))
    }

    /// Recognized texts that appear in `labels`, in OCR order
    pub fn find_texts<S: AsRef<str>>(&self, frame: &RgbImage, labels: &[S]) -> Result<Vec<TextArea>> {
        let areas = self.recognize_text(frame)?;
        Ok(select_texts(&areas, labels))
    }

    /// Recognized texts with `flag_label` found in the window
    /// `text_rect.move_by(flag_offset)`. An empty `texts` accepts every text.
    pub fn find_flagged_texts<S: AsRef<str>>(
        &self,
        frame: &RgbImage,
        texts: &[S],
        flag_label: &str,
        flag_offset: &Rect,
        threshold: f64,
    ) -> Result<Vec<FlagTextArea>> {
        let areas = self.recognize_text(frame)?;
        Ok(find_flagged(
            frame,
            &areas,
            texts,
            &self.templates,
            flag_label,
            flag_offset,
            threshold,
        ))
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new(&RecognizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::models::OcrModelFile;
    use crate::vision::AlgorithmKind;
    use image::Rgb;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// OCR engine returning a fixed set of areas
    struct FixedOcr {
        areas: Vec<TextArea>,
        threads: Arc<Mutex<usize>>,
        fail_init: bool,
    }

    impl FixedOcr {
        fn abc() -> (Self, Arc<Mutex<usize>>) {
            let threads = Arc::new(Mutex::new(0));
            let engine = Self {
                areas: vec![
                    TextArea::new("A", Rect::new(10, 10, 30, 12)),
                    TextArea::new("B", Rect::new(60, 10, 30, 12)),
                    TextArea::new("C", Rect::new(110, 10, 30, 12)),
                ],
                threads: threads.clone(),
                fail_init: false,
            };
            (engine, threads)
        }
    }

    impl TextRecognizer for FixedOcr {
        fn init_models(&mut self, _models: &OcrModels) -> Result<()> {
            if self.fail_init {
                return Err(RecognitionError::Ocr("bad model".to_string()));
            }
            Ok(())
        }

        fn set_num_threads(&mut self, threads: usize) {
            *self.threads.lock() = threads;
        }

        fn recognize(&self, _frame: &RgbImage) -> Result<Vec<TextArea>> {
            Ok(self.areas.clone())
        }
    }

    fn model_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for file in OcrModelFile::ALL {
            std::fs::write(dir.path().join(file.filename()), b"model").unwrap();
        }
        dir
    }

    fn ready_recognizer() -> Recognizer {
        let (engine, _) = FixedOcr::abc();
        let mut recognizer = Recognizer::default().with_text_recognizer(Box::new(engine));
        let dir = model_dir();
        assert!(recognizer.init_ocr_models(dir.path()));
        recognizer
    }

    fn scene(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 7 + y * 3) % 256) as u8,
                ((x * x + y * 11) % 200) as u8 + 30,
                ((y * y * 5 + x * 13) % 256) as u8,
            ])
        })
    }

    #[test]
    fn test_register_template_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.png");
        scene(20, 10).save(&path).unwrap();

        let mut recognizer = Recognizer::default();
        assert!(recognizer.register_template("ok", &path));
        assert!(!recognizer.register_template("bad", &dir.path().join("missing.png")));
        assert_eq!(recognizer.template_count(), 1);
    }

    #[test]
    fn test_register_feature_missing_file() {
        let mut recognizer = Recognizer::default();
        assert!(!recognizer.register_feature("x", Path::new("/nonexistent/x.png")));
        assert_eq!(recognizer.feature_count(), 0);
    }

    #[test]
    fn test_labels_sorted_and_unique() {
        let mut recognizer = Recognizer::default();
        recognizer.register_template_image("b", scene(10, 10));
        recognizer.register_template_image("a", scene(10, 10));
        recognizer.register_feature_image("b", &scene(40, 40));

        assert_eq!(recognizer.labels(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_locate_and_cache_round() {
        let frame = scene(120, 90);
        let template = image::imageops::crop_imm(&frame, 40, 30, 30, 20).to_image();

        let mut recognizer = Recognizer::default();
        recognizer.register_template_image("icon", template);
        recognizer.set_cache_enabled(true);

        let first = recognizer.locate(&frame, "icon");
        assert_eq!(first.kind, AlgorithmKind::MatchTemplate);
        assert_eq!(first.rect, Rect::new(40, 30, 30, 20).center_zoom(0.8));

        let second = recognizer.locate(&frame, "icon");
        assert_eq!(second.kind, AlgorithmKind::CompareHist);
        assert_eq!(second.rect, first.rect);

        recognizer.clear_cache();
        assert_eq!(recognizer.locate(&frame, "icon").kind, AlgorithmKind::MatchTemplate);

        assert_eq!(
            recognizer.locate(&frame, "unknown").kind,
            AlgorithmKind::JustReturn
        );
    }

    #[test]
    fn test_feature_lookup_unregistered_or_empty() {
        let recognizer = Recognizer::default();
        assert!(recognizer.locate_by_feature(&scene(60, 60), "nothing").is_none());
        assert!(recognizer.locate_all_by_feature(&scene(60, 60)).is_empty());
    }

    /// 10px blocks of random color
    fn blocks(width: u32, height: u32, seed: u64) -> RgbImage {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let (cols, rows) = (width.div_ceil(10), height.div_ceil(10));
        let colors: Vec<[u8; 3]> = (0..cols * rows).map(|_| rng.gen()).collect();
        RgbImage::from_fn(width, height, |x, y| Rgb(colors[((y / 10) * cols + x / 10) as usize]))
    }

    fn feature_recognizer() -> Recognizer {
        let mut config = RecognizerConfig::default();
        config.features.max_keypoints = 2000;
        Recognizer::new(&config)
    }

    #[test]
    fn test_locate_by_feature_finds_crop() {
        let frame = blocks(320, 240, 1);
        let crop_rect = Rect::new(100, 70, 160, 120);
        let reference = image::imageops::crop_imm(&frame, 100, 70, 160, 120).to_image();

        let mut recognizer = feature_recognizer();
        recognizer.register_feature_image("panel", &reference);

        let area = recognizer.locate_by_feature(&frame, "panel").unwrap();
        assert_eq!(area.text, "panel");
        assert!(crop_rect.contains(&area.rect), "{} outside {}", area.rect, crop_rect);
        assert!(!area.rect.is_empty());

        let all = recognizer.locate_all_by_feature(&frame);
        assert_eq!(all.len(), 1);
        assert!(crop_rect.contains(&all[0].rect));
    }

    #[test]
    fn test_locate_by_feature_unrelated_texture() {
        let reference = image::imageops::crop_imm(&blocks(320, 240, 1), 100, 70, 160, 120).to_image();
        let unrelated = blocks(320, 240, 99);

        let mut recognizer = feature_recognizer();
        recognizer.register_feature_image("panel", &reference);

        assert!(recognizer.locate_by_feature(&unrelated, "panel").is_none());
        assert!(recognizer.locate_all_by_feature(&unrelated).is_empty());
    }

    #[test]
    fn test_text_queries_need_ocr() {
        let recognizer = Recognizer::default();
        let frame = scene(20, 20);

        assert!(matches!(
            recognizer.find_text(&frame, "A"),
            Err(RecognitionError::OcrNotReady)
        ));

        let (engine, _) = FixedOcr::abc();
        let attached = Recognizer::default().with_text_recognizer(Box::new(engine));
        assert!(matches!(
            attached.find_texts(&frame, &["A"]),
            Err(RecognitionError::OcrNotReady)
        ));
    }

    #[test]
    fn test_init_requires_engine_and_files() {
        let dir = model_dir();
        let mut recognizer = Recognizer::default();
        assert!(!recognizer.init_ocr_models(dir.path()));

        let (engine, _) = FixedOcr::abc();
        let mut recognizer = recognizer.with_text_recognizer(Box::new(engine));
        let empty = tempdir().unwrap();
        assert!(!recognizer.init_ocr_models(empty.path()));
        assert!(!recognizer.is_ocr_ready());

        assert!(recognizer.init_ocr_models(dir.path()));
        assert!(recognizer.is_ocr_ready());
    }

    #[test]
    fn test_init_from_configured_dir() {
        let dir = model_dir();
        let (engine, _) = FixedOcr::abc();
        let mut unconfigured = Recognizer::default().with_text_recognizer(Box::new(engine));
        assert!(!unconfigured.init_configured_ocr_models());

        let mut config = RecognizerConfig::default();
        config.ocr.model_dir = Some(dir.path().to_path_buf());
        let (engine, _) = FixedOcr::abc();
        let mut recognizer = Recognizer::new(&config).with_text_recognizer(Box::new(engine));

        assert!(recognizer.init_configured_ocr_models());
        assert!(recognizer.is_ocr_ready());
    }

    #[test]
    fn test_engine_init_failure() {
        let (mut engine, _) = FixedOcr::abc();
        engine.fail_init = true;
        let mut recognizer = Recognizer::default().with_text_recognizer(Box::new(engine));

        assert!(!recognizer.init_ocr_models(model_dir().path()));
        assert!(!recognizer.is_ocr_ready());
    }

    #[test]
    fn test_thread_count_forwarded() {
        let (engine, threads) = FixedOcr::abc();
        let mut recognizer = Recognizer::default().with_text_recognizer(Box::new(engine));
        assert_eq!(*threads.lock(), 4);

        recognizer.set_ocr_threads(2);
        assert_eq!(*threads.lock(), 2);
        assert_eq!(recognizer.ocr_threads(), 2);
    }

    #[test]
    fn test_find_text() {
        let recognizer = ready_recognizer();
        let frame = scene(160, 40);

        assert_eq!(
            recognizer.find_text(&frame, "B").unwrap(),
            Some(Rect::new(60, 10, 30, 12))
        );
        assert_eq!(recognizer.find_text(&frame, "Z").unwrap(), None);
    }

    #[test]
    fn test_find_texts_in_ocr_order() {
        let recognizer = ready_recognizer();
        let frame = scene(160, 40);

        let found = recognizer.find_texts(&frame, &["C", "A", "Z"]).unwrap();
        assert_eq!(
            found,
            vec![
                TextArea::new("A", Rect::new(10, 10, 30, 12)),
                TextArea::new("C", Rect::new(110, 10, 30, 12)),
            ]
        );
    }

    #[test]
    fn test_find_flagged_texts_without_flag_template() {
        let recognizer = ready_recognizer();
        let found = recognizer
            .find_flagged_texts(&scene(160, 40), &["A"], "flag", &Rect::new(-10, 0, 10, 12), 0.8)
            .unwrap();
        assert!(found.is_empty());
    }
}
