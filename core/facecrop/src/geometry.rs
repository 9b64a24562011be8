//! Face-guided crop geometry.
//!
//! All rectangles here live in percentage-of-image space: `0..=100` on both
//! axes, origin at the top-left corner. Aspect ratios are measured in the same
//! units, so a square crop always has `width == height`.
//!
//! With a face, the crop is sized from the larger of the face's percentage
//! width and height times [`GeometrySettings::margin_factor`], reshaped to the
//! requested aspect, centered on the face and clamped inside the image.
//! Without one, a centered rectangle inset by
//! [`GeometrySettings::fallback_inset`] on every side is used instead.

use serde::{Deserialize, Serialize};

use crate::aspect::AspectChoice;
use crate::error::FaceCropError;
use crate::export::PixelCrop;
use crate::face_detector::FaceBox;

/// How much larger than the face the default crop is.
pub const DEFAULT_MARGIN_FACTOR: f64 = 1.5;

/// Inset (percent, per side) of the crop used when no face is known.
pub const DEFAULT_FALLBACK_INSET: f64 = 5.0;

/// Tolerance for bound and ratio checks on computed rectangles.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Tunable constants of the crop computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeometrySettings {
    /// Multiplier applied to the larger face dimension.
    pub margin_factor: f64,
    /// Per-side inset of the no-face crop, in percent.
    pub fallback_inset: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            margin_factor: DEFAULT_MARGIN_FACTOR,
            fallback_inset: DEFAULT_FALLBACK_INSET,
        }
    }
}

impl GeometrySettings {
    pub fn validate(&self) -> Result<(), FaceCropError> {
        if !self.margin_factor.is_finite() || self.margin_factor <= 0.0 {
            return Err(FaceCropError::InvalidSettings(format!(
                "margin factor must be positive, got {}",
                self.margin_factor
            )));
        }
        if !(0.0..50.0).contains(&self.fallback_inset) {
            return Err(FaceCropError::InvalidSettings(format!(
                "fallback inset must be in [0, 50), got {}",
                self.fallback_inset
            )));
        }
        Ok(())
    }
}

/// Crop rectangle in percentage-of-image units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Width over height, in percentage units.
    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    /// True when the rectangle lies fully inside `[0, 100]` on both axes.
    pub fn is_within_bounds(&self) -> bool {
        self.x >= -GEOMETRY_EPSILON
            && self.y >= -GEOMETRY_EPSILON
            && self.right() <= 100.0 + GEOMETRY_EPSILON
            && self.bottom() <= 100.0 + GEOMETRY_EPSILON
    }

    pub fn has_aspect(&self, aspect: AspectChoice) -> bool {
        self.height > 0.0 && (self.aspect() - aspect.ratio()).abs() <= GEOMETRY_EPSILON
    }

    /// Convert to pixels of an image displayed at `displayed_width` × `displayed_height`.
    pub fn to_pixels(&self, displayed_width: u32, displayed_height: u32) -> PixelCrop {
        let (w, h) = (displayed_width as f64, displayed_height as f64);
        PixelCrop {
            x: self.x * w / 100.0,
            y: self.y * h / 100.0,
            width: self.width * w / 100.0,
            height: self.height * h / 100.0,
        }
    }

    /// Re-impose `aspect` and the image bounds on a user-edited rectangle.
    ///
    /// The top-left corner and the width are kept, the height is derived from
    /// the width. If that overflows, both sides shrink until the taller one
    /// fits, and the origin is finally pulled back inside the image.
    pub fn constrain(self, aspect: AspectChoice) -> CropRect {
        let ratio = aspect.ratio();
        let x = sanitize_percent(self.x);
        let y = sanitize_percent(self.y);
        let mut width = sanitize_percent(self.width);
        let mut height = width / ratio;
        if height > 100.0 {
            height = 100.0;
            width = height * ratio;
        }

        CropRect {
            x: clamp_origin(x, width),
            y: clamp_origin(y, height),
            width,
            height,
        }
    }
}

/// Default crop for an image, centered on `face` when one is available.
///
/// A missing face, an unusable face box or a zero-sized image all produce
/// [`fallback_crop`].
pub fn compute_crop(
    image_width: u32,
    image_height: u32,
    face: Option<&FaceBox>,
    aspect: AspectChoice,
    settings: &GeometrySettings,
) -> CropRect {
    match face {
        Some(face) if face.is_usable() && image_width > 0 && image_height > 0 => {
            face_crop(image_width, image_height, face, aspect, settings)
        }
        _ => fallback_crop(aspect, settings),
    }
}

/// Centered crop used when no face is known.
pub fn fallback_crop(aspect: AspectChoice, settings: &GeometrySettings) -> CropRect {
    let inset = settings.fallback_inset;
    let inner = 100.0 - 2.0 * inset;
    let (width, height) = shape_for_aspect(inner, aspect.ratio());

    CropRect {
        x: inset + (inner - width) / 2.0,
        y: inset + (inner - height) / 2.0,
        width,
        height,
    }
}

fn face_crop(
    image_width: u32,
    image_height: u32,
    face: &FaceBox,
    aspect: AspectChoice,
    settings: &GeometrySettings,
) -> CropRect {
    let (img_w, img_h) = (image_width as f64, image_height as f64);
    let face_x = face.x / img_w * 100.0;
    let face_y = face.y / img_h * 100.0;
    let face_w = face.width / img_w * 100.0;
    let face_h = face.height / img_h * 100.0;

    let size = face_w.max(face_h) * settings.margin_factor;
    if !size.is_finite() || size <= 0.0 {
        log::debug!("face box {face:?} is out of range, using centered crop");
        return fallback_crop(aspect, settings);
    }
    let (mut width, mut height) = shape_for_aspect(size, aspect.ratio());

    let longest = width.max(height);
    if longest > 100.0 {
        let scale = 100.0 / longest;
        width *= scale;
        height *= scale;
    }

    let x = face_x - (width - face_w) / 2.0;
    let y = face_y - (height - face_h) / 2.0;

    log::debug!(
        "face at ({face_x:.2}%, {face_y:.2}%) size {face_w:.2}%x{face_h:.2}% -> crop {width:.2}%x{height:.2}%"
    );

    CropRect {
        x: clamp_origin(x, width),
        y: clamp_origin(y, height),
        width,
        height,
    }
}

/// Rectangle of the given ratio whose primary side equals `size`.
///
/// Portrait ratios keep the height, wide ratios keep the width, square keeps both.
fn shape_for_aspect(size: f64, ratio: f64) -> (f64, f64) {
    if ratio <= 1.0 {
        (size * ratio, size)
    } else {
        (size, size / ratio)
    }
}

fn clamp_origin(origin: f64, size: f64) -> f64 {
    origin.min(100.0 - size).max(0.0)
}

fn sanitize_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
