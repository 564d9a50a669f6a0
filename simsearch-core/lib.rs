use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Channel count of every raster handled by the pipeline (RGB)
pub const CHANNELS: usize = 3;

/// Length of a gradient-histogram descriptor: 4x4 cells x 8 orientation bins
pub const DESCRIPTOR_LEN: usize = 128;

/// 128-dimensional local descriptor
pub type Descriptor = [f32; DESCRIPTOR_LEN];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("invalid raster dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("raster buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
}

/// Owned row-major interleaved RGB pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl RasterImage {
    /// Wraps an RGB buffer, checking `width * height * 3 == data.len()`
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidDimensions { width, height });
        }
        let expected = width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(CHANNELS))
            .ok_or(RasterError::InvalidDimensions { width, height })?;
        if data.len() != expected {
            return Err(RasterError::BufferMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Solid-colour raster, mostly useful for fixtures
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Result<Self, RasterError> {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width.saturating_mul(height).saturating_mul(CHANNELS))
            .collect();
        Self::new(data, width, height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        CHANNELS
    }

    /// Larger of width and height
    pub fn max_side(&self) -> usize {
        self.width.max(self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGB triple at `(x, y)`; `None` outside the raster
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}

/// Scale-space keypoint with canonical orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,         // image coordinates
    pub y: f32,
    pub scale: f32,     // Gaussian sigma in image coordinates
    pub angle: f32,     // radians, [0, 2pi)
    pub response: f32,  // |DoG| contrast at the refined extremum
    pub octave: usize,
    pub layer: f32,     // fractional layer inside the octave
}

/// Keypoints and their descriptors for one image, paired by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<Descriptor>) -> Self {
        assert_eq!(
            keypoints.len(),
            descriptors.len(),
            "every keypoint needs exactly one descriptor"
        );
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Keypoint, &Descriptor)> {
        self.keypoints.iter().zip(self.descriptors.iter())
    }
}

/// One reference image of the corpus
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorpusEntry {
    pub id: u64,
    pub name: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub attribution: Option<String>,
    pub image_url: String,
}

impl CorpusEntry {
    pub fn new(id: u64, name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attribution: None,
            image_url: image_url.into(),
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Attribution for display; absent attribution renders as ""
    pub fn attribution_or_empty(&self) -> &str {
        self.attribution.as_deref().unwrap_or("")
    }
}

/// Nearest and runner-up candidate for one query descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPair {
    pub query_index: usize,
    pub candidate_index: usize,
    pub distance: f32,
    pub second_distance: f32,
}

/// Score that never counts as a match
pub const NO_SIMILARITY: usize = 0;

/// Corpus entry with its confident-match count
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ScoredCandidate {
    /// Position of the entry in the searched corpus slice
    pub position: usize,
    pub entry: CorpusEntry,
    pub score: usize,
}

/// Worker count used when none is configured
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}

/// Builds a dedicated pool with the specified number of threads
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads.max(1))
        .thread_name(|i| format!("simsearch-worker-{i}"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_rejects_mismatched_buffer() {
        let result = RasterImage::new(vec![0; 10], 2, 2);
        assert_eq!(
            result,
            Err(RasterError::BufferMismatch {
                expected: 12,
                actual: 10
            })
        );
    }

    #[test]
    fn test_raster_rejects_zero_dimensions() {
        assert!(matches!(
            RasterImage::new(Vec::new(), 0, 4),
            Err(RasterError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_raster_pixel_access() {
        let img = RasterImage::new((0..12).collect(), 2, 2).unwrap();
        assert_eq!(img.pixel(1, 1), Some([9, 10, 11]));
        assert_eq!(img.pixel(2, 0), None);
        assert_eq!(img.channels(), 3);
        assert_eq!(img.max_side(), 2);
    }

    #[test]
    fn test_filled_raster() {
        let img = RasterImage::filled(3, 2, [1, 2, 3]).unwrap();
        assert_eq!(img.as_bytes().len(), 18);
        assert_eq!(img.pixel(2, 1), Some([1, 2, 3]));
    }

    #[test]
    fn test_attribution_defaults_to_empty() {
        let entry = CorpusEntry::new(7, "starry.jpg", "file:///tmp/starry.jpg");
        assert_eq!(entry.attribution_or_empty(), "");
        let entry = entry.with_attribution("Vincent van Gogh");
        assert_eq!(entry.attribution_or_empty(), "Vincent van Gogh");
    }

    #[test]
    #[should_panic]
    fn test_descriptor_set_requires_pairing() {
        let kp = Keypoint {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            angle: 0.0,
            response: 0.1,
            octave: 0,
            layer: 1.0,
        };
        DescriptorSet::new(vec![kp], Vec::new());
    }

    #[test]
    fn test_thread_pool_is_bounded() {
        let pool = build_thread_pool(2).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        let pool = build_thread_pool(0).unwrap();
        assert_eq!(pool.current_num_threads(), 1);
    }
}
