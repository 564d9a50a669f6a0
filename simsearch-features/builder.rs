use crate::config::ExtractorConfig;
use crate::detector::SiftExtractor;
use crate::error::FeatureResult;

/// Builder for creating a `SiftExtractor`
#[derive(Debug, Clone, Default)]
pub struct ExtractorBuilder {
    config: ExtractorConfig,
}

impl ExtractorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sampled scales per octave
    pub fn layers_per_octave(mut self, layers: usize) -> Self {
        self.config.layers_per_octave = layers;
        self
    }

    /// Base Gaussian sigma of each octave
    pub fn sigma(mut self, sigma: f32) -> Self {
        self.config.sigma = sigma;
        self
    }

    /// Blur already present in the input image
    pub fn assumed_blur(mut self, blur: f32) -> Self {
        self.config.assumed_blur = blur;
        self
    }

    pub fn max_octaves(mut self, octaves: usize) -> Self {
        self.config.max_octaves = octaves;
        self
    }

    /// Minimum DoG contrast of a kept keypoint
    pub fn contrast_threshold(mut self, threshold: f32) -> Self {
        self.config.contrast_threshold = threshold;
        self
    }

    /// Principal curvature ratio above which edge-like extrema are dropped
    pub fn edge_threshold(mut self, threshold: f32) -> Self {
        self.config.edge_threshold = threshold;
        self
    }

    pub fn border(mut self, border: usize) -> Self {
        self.config.border = border;
        self
    }

    /// Keep at most `n` keypoints (0 = unlimited)
    pub fn max_features(mut self, n: usize) -> Self {
        self.config.max_features = n;
        self
    }

    pub fn preset_fast(mut self) -> Self {
        self.config = ExtractorConfig::fast_preset();
        self
    }

    pub fn preset_balanced(mut self) -> Self {
        self.config = ExtractorConfig::balanced_preset();
        self
    }

    pub fn preset_precision(mut self) -> Self {
        self.config = ExtractorConfig::precision_preset();
        self
    }

    /// Build the `SiftExtractor`
    pub fn build(self) -> FeatureResult<SiftExtractor> {
        SiftExtractor::new(self.config)
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        self.config.summary()
    }

    /// Create a builder from an existing `ExtractorConfig`
    pub fn from_config(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Convert the builder into an `ExtractorConfig`
    pub fn to_config(self) -> ExtractorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeatureError;

    #[test]
    fn test_fluent_settings() {
        let cfg = ExtractorBuilder::new()
            .layers_per_octave(4)
            .sigma(1.2)
            .contrast_threshold(0.02)
            .max_features(100)
            .to_config();
        assert_eq!(cfg.layers_per_octave, 4);
        assert_eq!(cfg.sigma, 1.2);
        assert_eq!(cfg.contrast_threshold, 0.02);
        assert_eq!(cfg.max_features, 100);
    }

    #[test]
    fn test_build_validates() {
        assert!(ExtractorBuilder::new().preset_fast().build().is_ok());
        let err = ExtractorBuilder::new().layers_per_octave(0).build();
        assert!(matches!(err, Err(FeatureError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_round_trip() {
        let cfg = ExtractorConfig::precision_preset();
        assert_eq!(cfg.clone().to_builder().to_config(), cfg);
    }
}
