use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::error::FaceCropError;

/// Content-type prefix a file must carry to be accepted.
pub const IMAGE_MIME_PREFIX: &str = "image/";

/// Whether a declared content type names an image.
pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with(IMAGE_MIME_PREFIX)
}

/// Accept a user-supplied file if it declares an image type.
///
/// Anything else is dropped without an error: the caller simply keeps its
/// current state.
pub fn accept(mime: &str, bytes: &[u8]) -> Option<ImageSource> {
    if !is_image_mime(mime) {
        log::debug!("ignoring file with content type {mime:?}");
        return None;
    }
    if bytes.is_empty() {
        log::debug!("ignoring empty {mime} file");
        return None;
    }
    Some(ImageSource::from_bytes(mime, bytes))
}

/// Display-ready encoding of the chosen image: a `data:` URL with the file
/// content inlined as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    data_url: String,
    mime_len: usize,
}

impl ImageSource {
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        let data_url = format!("data:{mime};base64,{}", BASE64.encode(bytes));
        Self {
            mime_len: mime.len(),
            data_url,
        }
    }

    /// Parse a base64 `data:` URL carrying an image type.
    pub fn parse(data_url: &str) -> Result<Self, FaceCropError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or(FaceCropError::UnsupportedFormat)?;
        let (header, payload) = rest.split_once(',').ok_or(FaceCropError::UnsupportedFormat)?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or(FaceCropError::UnsupportedFormat)?;
        if !is_image_mime(mime) {
            return Err(FaceCropError::UnsupportedFormat);
        }
        let bytes = BASE64
            .decode(payload)
            .map_err(|e| FaceCropError::DecodeError(e.to_string()))?;
        Ok(Self::from_bytes(mime, &bytes))
    }

    /// The full `data:` URL, suitable for an `<img src>`.
    pub fn as_str(&self) -> &str {
        &self.data_url
    }

    pub fn mime(&self) -> &str {
        &self.data_url["data:".len().."data:".len() + self.mime_len]
    }

    /// Raw file bytes.
    pub fn bytes(&self) -> Result<Vec<u8>, FaceCropError> {
        let (_, payload) = self
            .data_url
            .split_once(',')
            .ok_or(FaceCropError::UnsupportedFormat)?;
        BASE64
            .decode(payload)
            .map_err(|e| FaceCropError::DecodeError(e.to_string()))
    }

    /// Decode the file into pixels at natural resolution.
    ///
    /// The EXIF orientation is applied, so the pixels and the natural size
    /// match what a browser shows for the same file.
    pub fn decode(&self) -> Result<DynamicImage, FaceCropError> {
        let bytes = self.bytes()?;
        let mut decoder = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| FaceCropError::DecodeError(e.to_string()))?
            .into_decoder()
            .map_err(|e| FaceCropError::DecodeError(e.to_string()))?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image =
            DynamicImage::from_decoder(decoder).map_err(|e| FaceCropError::DecodeError(e.to_string()))?;
        if !matches!(orientation, Orientation::NoTransforms) {
            log::debug!("applying EXIF orientation {orientation:?}");
            image.apply_orientation(orientation);
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(FaceCropError::ZeroDimensions);
        }
        Ok(image)
    }
}
