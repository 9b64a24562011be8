use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::FaceCropError;
use crate::face_detector::{FaceBox, FaceDetector};

/// Relative path the SeetaFace frontal model is loaded from by default.
pub const DEFAULT_MODEL_PATH: &str = "models/seeta_fd_frontal_v1.0.bin";

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is read once on construction and cloned into a fresh detector
/// per call, since rustface detectors are stateful.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load the model from [`DEFAULT_MODEL_PATH`], relative to the working directory.
    pub fn load_default() -> Result<Self, FaceCropError> {
        Self::from_path(DEFAULT_MODEL_PATH)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FaceCropError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| FaceCropError::ModelLoad(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, FaceCropError> {
        let model =
            rustface::read_model(reader).map_err(|e| FaceCropError::ModelLoad(format!("{e:?}")))?;
        Ok(Self { model })
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>, FaceCropError> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox {
                    x: bbox.x() as f64,
                    y: bbox.y() as f64,
                    width: bbox.width() as f64,
                    height: bbox.height() as f64,
                    confidence: face.score(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_a_load_error() {
        let result = RustfaceDetector::from_path("does/not/exist.bin");
        assert!(matches!(result, Err(FaceCropError::ModelLoad(_))));
    }
}
