use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::FaceCropError;

/// File name the exported crop is offered under.
pub const EXPORT_FILE_NAME: &str = "cropped-image.jpg";

/// MIME type of the exported file.
pub const EXPORT_MIME: &str = "image/jpeg";

/// Fixed JPEG quality of the export, on the encoder's 1-100 scale.
pub const EXPORT_JPEG_QUALITY: u8 = 92;

/// Crop rectangle in the pixel space of the *displayed* image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelCrop {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelCrop {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Pixel size of the exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportResolution {
    /// Same pixel size as the crop on screen.
    #[default]
    Displayed,

    /// Native pixel size of the cropped region in the source file.
    Natural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportSettings {
    pub file_name: String,
    pub resolution: ExportResolution,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            file_name: EXPORT_FILE_NAME.to_string(),
            resolution: ExportResolution::default(),
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> Result<(), FaceCropError> {
        if self.file_name.trim().is_empty() {
            return Err(FaceCropError::InvalidSettings(
                "export file name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Encoded crop, ready to be offered as a download.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    /// JPEG bytes.
    pub data: Vec<u8>,

    /// Width of the encoded image in pixels.
    pub width: u32,

    /// Height of the encoded image in pixels.
    pub height: u32,

    pub file_name: String,
}

impl ExportedImage {
    pub fn mime(&self) -> &'static str {
        EXPORT_MIME
    }
}

/// Cut `crop` out of `image` and encode it as JPEG.
///
/// `crop` is expressed against the image as displayed at
/// `displayed_width` × `displayed_height`. It is scaled per axis onto the
/// natural resolution before sampling, so the source pixels are always read
/// at full resolution.
pub fn export_crop(
    image: &DynamicImage,
    displayed_width: u32,
    displayed_height: u32,
    crop: PixelCrop,
    settings: &ExportSettings,
) -> Result<ExportedImage, FaceCropError> {
    if displayed_width == 0 || displayed_height == 0 {
        return Err(FaceCropError::ZeroDimensions);
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(FaceCropError::ZeroDimensions);
    }

    let scale_x = image.width() as f64 / displayed_width as f64;
    let scale_y = image.height() as f64 / displayed_height as f64;

    let (src_x, src_width) = source_span(crop.x, crop.width, scale_x, image.width())?;
    let (src_y, src_height) = source_span(crop.y, crop.height, scale_y, image.height())?;

    let (out_width, out_height) = match settings.resolution {
        ExportResolution::Displayed => (output_side(crop.width)?, output_side(crop.height)?),
        ExportResolution::Natural => (src_width, src_height),
    };

    log::debug!(
        "exporting source region ({src_x}, {src_y}, {src_width}x{src_height}) as {out_width}x{out_height}"
    );

    let region = image.crop_imm(src_x, src_y, src_width, src_height);
    let resized = if (out_width, out_height) == (src_width, src_height) {
        region
    } else {
        region.resize_exact(out_width, out_height, FilterType::Lanczos3)
    };

    let rgb = flatten_alpha(&resized);
    let data = encode_jpeg(&rgb, EXPORT_JPEG_QUALITY)?;

    Ok(ExportedImage {
        data,
        width: rgb.width(),
        height: rgb.height(),
        file_name: settings.file_name.clone(),
    })
}

/// Map a displayed-space span onto the source axis, clamped to `limit`.
fn source_span(start: f64, len: f64, scale: f64, limit: u32) -> Result<(u32, u32), FaceCropError> {
    if !start.is_finite() || !len.is_finite() {
        return Err(FaceCropError::EmptyCrop);
    }
    let begin = (start * scale).round().clamp(0.0, limit as f64);
    let end = ((start + len) * scale).round().clamp(0.0, limit as f64);
    if end <= begin {
        return Err(FaceCropError::EmptyCrop);
    }
    Ok((begin as u32, (end - begin) as u32))
}

fn output_side(len: f64) -> Result<u32, FaceCropError> {
    let side = len.round();
    if !side.is_finite() || side < 1.0 {
        return Err(FaceCropError::EmptyCrop);
    }
    Ok(side as u32)
}

/// Flatten alpha channel by compositing onto a white background.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let inv_alpha = 1.0 - alpha;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * inv_alpha).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }

    rgb
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FaceCropError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| FaceCropError::EncodeError(e.to_string()))?;
    Ok(buffer)
}
