use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceCropError {
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    #[error("unsupported image source")]
    UnsupportedFormat,

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("failed to encode image: {0}")]
    EncodeError(String),

    #[error("crop region is empty")]
    EmptyCrop,

    #[error("face detection failed: {0}")]
    DetectionFailed(String),

    #[error("failed to load detector model: {0}")]
    ModelLoad(String),

    #[error("unknown aspect ratio: {0}")]
    InvalidAspect(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
