//! Scale-space keypoints and 128-bin gradient descriptors.
//!
//! The pipeline is decode, bound the size, convert to intensity, build a
//! Gaussian/DoG scale space, keep refined contrast- and edge-filtered extrema,
//! assign dominant orientations and describe each oriented keypoint.

pub mod builder;
pub mod config;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod preprocessing;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use builder::ExtractorBuilder;
pub use config::ExtractorConfig;
pub use descriptor::DescriptorGenerator;
pub use detector::SiftExtractor;
pub use error::{FeatureError, FeatureResult};
pub use preprocessing::ImagePreprocessing;
pub use pyramid::ScaleSpace;
pub use types::GrayImage;

use simsearch_core::{DescriptorSet, RasterImage};

/// Decode, bound to `max_dimension` and extract features in one call
pub fn extract_from_bytes(
    bytes: &[u8],
    max_dimension: Option<u32>,
    extractor: &SiftExtractor,
) -> FeatureResult<(RasterImage, DescriptorSet)> {
    let decoded = ImagePreprocessing::decode(bytes)?;
    let raster = match max_dimension {
        Some(max) => ImagePreprocessing::resize(&decoded, max)?,
        None => decoded,
    };
    let features = extractor.extract(&raster)?;
    Ok((raster, features))
}
