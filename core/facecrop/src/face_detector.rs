use image::DynamicImage;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::FaceCropError;

/// Bounding box of a detected face, in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    /// X coordinate of the top-left corner (pixels).
    pub x: f64,
    /// Y coordinate of the top-left corner (pixels).
    pub y: f64,
    /// Width of the bounding box (pixels).
    pub width: f64,
    /// Height of the bounding box (pixels).
    pub height: f64,
    /// Detection confidence score. Backends that do not report one leave it at 0.
    #[serde(default)]
    pub confidence: f64,
}

impl FaceBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 0.0,
        }
    }

    /// A box is usable when every coordinate is finite and it has a positive extent.
    pub fn is_usable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Pluggable face detection backend.
///
/// Implement this trait to plug in any detector (SeetaFace, ONNX, a remote
/// service...) and hand it to [`crate::CropSession::run_detection`].
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>, FaceCropError>;
}

/// First usable detection in detector order.
pub fn first_face(faces: &[FaceBox]) -> Option<FaceBox> {
    faces.iter().copied().find(FaceBox::is_usable)
}

/// Run `detector` over `image` and return the first usable face.
pub fn detect_first_face(
    detector: &dyn FaceDetector,
    image: &DynamicImage,
) -> Result<Option<FaceBox>, FaceCropError> {
    let gray = image.to_luma8();
    let faces = detector.detect(gray.as_raw(), gray.width(), gray.height())?;
    log::debug!("detector returned {} face(s)", faces.len());
    Ok(first_face(&faces))
}

/// Lazily-initialized, process-wide detector slot.
///
/// The loader runs at most once. A failed load is remembered as "no detector"
/// so callers fall back to the centered crop for the rest of the session.
///
/// ```
/// use facecrop::{DetectorHandle, FaceBox, FaceCropError, FaceDetector};
///
/// struct NoFaces;
/// impl FaceDetector for NoFaces {
///     fn detect(&self, _: &[u8], _: u32, _: u32) -> Result<Vec<FaceBox>, FaceCropError> {
///         Ok(vec![])
///     }
/// }
///
/// static DETECTOR: DetectorHandle = DetectorHandle::new();
/// let detector = DETECTOR.get_or_load(|| Ok(Box::new(NoFaces)));
/// assert!(detector.is_some());
/// ```
pub struct DetectorHandle {
    slot: OnceCell<Option<Box<dyn FaceDetector>>>,
}

impl DetectorHandle {
    pub const fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    /// Return the detector, running `load` if no load has been attempted yet.
    pub fn get_or_load<F>(&self, load: F) -> Option<&dyn FaceDetector>
    where
        F: FnOnce() -> Result<Box<dyn FaceDetector>, FaceCropError>,
    {
        self.slot
            .get_or_init(|| match load() {
                Ok(detector) => {
                    log::info!("face detector loaded");
                    Some(detector)
                }
                Err(e) => {
                    log::warn!("face detector unavailable, using centered crops: {e}");
                    None
                }
            })
            .as_deref()
    }

    /// The loaded detector, if a load was attempted and succeeded.
    pub fn get(&self) -> Option<&dyn FaceDetector> {
        self.slot.get().and_then(|slot| slot.as_deref())
    }

    /// Whether a load has been attempted, successful or not.
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl Default for DetectorHandle {
    fn default() -> Self {
        Self::new()
    }
}
