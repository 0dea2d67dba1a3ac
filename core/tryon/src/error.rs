use thiserror::Error;

#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("image not found or not decodable: {0}")]
    ImageNotFound(String),

    #[error("no person detected in the photo; use a clear front-facing photo")]
    PoseNotDetected,

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("failed to encode image: {0}")]
    EncodeError(String),

    #[error("failed to resize garment: {0}")]
    ResizeError(String),

    #[error("invalid fit configuration: {0}")]
    InvalidFitConfig(String),

    #[error("quality must be between 0.0 and 1.0, got {0}")]
    InvalidQuality(f32),

    #[error("invalid keypoints: {0}")]
    InvalidKeypoints(String),
}
