//! Face-guided image cropping: intake, crop geometry and JPEG export for a
//! crop widget.
//!
//! # Example
//!
//! ```no_run
//! use facecrop::{AspectChoice, CropSession};
//!
//! let bytes = std::fs::read("portrait.jpg").unwrap();
//! let mut session = CropSession::new().with_aspect(AspectChoice::Portrait);
//!
//! let ticket = session.offer_file("image/jpeg", &bytes).unwrap().unwrap();
//! // No detector: the centered fallback crop is used.
//! session.run_detection(ticket, None);
//!
//! // The user accepts the suggested crop, shown at 800x600 on screen.
//! let crop = session.crop().unwrap();
//! session.commit_crop(crop);
//! let exported = session.export(800, 600).unwrap().unwrap();
//! std::fs::write(&exported.file_name, &exported.data).unwrap();
//! ```

mod aspect;
mod error;
/// Pixel-space export of a committed crop.
pub mod export;
/// Face detection trait, face box type and the shared detector handle.
pub mod face_detector;
/// Percentage-space crop computation.
pub mod geometry;
/// File intake and the data-URL image source.
pub mod intake;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
pub mod session;

/// Aspect ratios the crop can be locked to.
pub use aspect::AspectChoice;
/// Error type returned by facecrop operations.
pub use error::FaceCropError;
pub use export::{
    export_crop, ExportResolution, ExportSettings, ExportedImage, PixelCrop, EXPORT_FILE_NAME,
};
pub use face_detector::{detect_first_face, first_face, DetectorHandle, FaceBox, FaceDetector};
pub use geometry::{compute_crop, fallback_crop, CropRect, GeometrySettings};
pub use intake::{accept, is_image_mime, ImageSource};
#[cfg(feature = "rustface")]
/// Built-in detector that loads the SeetaFace model from disk.
pub use rustface_backend::{RustfaceDetector, DEFAULT_MODEL_PATH};
pub use session::{CropSession, DetectionTicket, SessionSnapshot};
