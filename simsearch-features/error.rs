use simsearch_core::RasterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("malformed or unsupported image data: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("max dimension must be at least 1 pixel")]
    InvalidMaxDimension,
    #[error("invalid extractor configuration: {0}")]
    InvalidConfig(String),
    #[error("feature extraction failed: {0}")]
    Extraction(String),
    #[error("configuration format error: {0}")]
    ConfigFormat(String),
    #[error("configuration io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeatureError {
    /// True when the failure came from undecodable input bytes
    pub fn is_decode(&self) -> bool {
        matches!(self, FeatureError::Decode(_))
    }
}

pub type FeatureResult<T> = Result<T, FeatureError>;
