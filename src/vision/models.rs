//! OCR model file layout
//!
//! The text engine needs four files side by side in one directory. This
//! module only resolves and checks them; loading is up to the engine.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::{RecognitionError, Result};

/// One of the files making up an OCR model directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrModelFile {
    /// Text detection network (DBNet)
    Detection,
    /// Text angle classifier
    Classifier,
    /// Text recognition network (CRNN)
    Recognition,
    /// Character table for the recognizer
    Keys,
}

impl OcrModelFile {
    pub const ALL: [OcrModelFile; 4] = [
        OcrModelFile::Detection,
        OcrModelFile::Classifier,
        OcrModelFile::Recognition,
        OcrModelFile::Keys,
    ];

    /// Get the filename for this model file
    pub fn filename(&self) -> &'static str {
        match self {
            OcrModelFile::Detection => "dbnet.onnx",
            OcrModelFile::Classifier => "angle_net.onnx",
            OcrModelFile::Recognition => "crnn_lite_lstm.onnx",
            OcrModelFile::Keys => "keys.txt",
        }
    }

    /// Display name for progress reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            OcrModelFile::Detection => "Text Detection",
            OcrModelFile::Classifier => "Angle Classifier",
            OcrModelFile::Recognition => "Text Recognition",
            OcrModelFile::Keys => "Character Keys",
        }
    }
}

/// Resolved paths of a complete OCR model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModels {
    dir: PathBuf,
}

impl OcrModels {
    /// Check that `dir` holds every model file.
    ///
    /// Fails with [`RecognitionError::ModelFilesMissing`] listing the absent
    /// filenames.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let missing: Vec<&'static str> = OcrModelFile::ALL
            .iter()
            .filter(|file| !dir.join(file.filename()).is_file())
            .map(|file| {
                warn!("{} model not found in {:?}", file.display_name(), dir);
                file.filename()
            })
            .collect();

        if !missing.is_empty() {
            return Err(RecognitionError::ModelFilesMissing {
                dir: dir.to_path_buf(),
                missing,
            });
        }

        info!("OCR models found in {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of one model file
    pub fn path(&self, file: OcrModelFile) -> PathBuf {
        let path = self.dir.join(file.filename());
        debug!("Resolved {} at {:?}", file.display_name(), path);
        path
    }
}
