use crate::builder::ExtractorBuilder;
use crate::error::{FeatureError, FeatureResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complete extractor configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ExtractorConfig {
    /// Scale-space sampling
    pub layers_per_octave: usize,
    pub sigma: f32,
    pub assumed_blur: f32,
    pub max_octaves: usize,
    /// Keypoint filtering
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub border: usize,
    /// Keep only the strongest responses; 0 keeps everything
    pub max_features: usize,
    /// Metadata
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            layers_per_octave: 3,
            sigma: 1.6,
            assumed_blur: 0.5,
            max_octaves: 8,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            border: 5,
            max_features: 0,
            name: None,
            description: None,
        }
    }
}

impl ExtractorConfig {
    /// Fewer octaves and a capped feature count for quick searches
    pub fn fast_preset() -> Self {
        Self {
            max_octaves: 5,
            contrast_threshold: 0.06,
            max_features: 500,
            name: Some("Fast".to_string()),
            description: Some("Capped feature count for low-latency searches".to_string()),
            ..Self::default()
        }
    }

    /// Standard scale-space parameters
    pub fn balanced_preset() -> Self {
        Self {
            name: Some("Balanced".to_string()),
            description: Some("Standard scale-space parameters".to_string()),
            ..Self::default()
        }
    }

    /// Lower contrast threshold, more keypoints on low-texture images
    pub fn precision_preset() -> Self {
        Self {
            contrast_threshold: 0.03,
            edge_threshold: 12.0,
            name: Some("Precision".to_string()),
            description: Some("More keypoints on weakly textured images".to_string()),
            ..Self::default()
        }
    }

    /// Add metadata to configuration
    pub fn with_metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self
    }

    /// Convert to ExtractorBuilder for further customization
    pub fn to_builder(self) -> ExtractorBuilder {
        ExtractorBuilder::from_config(self)
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "ExtractorConfig: layers={}, sigma={:.2}, octaves<={}, contrast={:.3}, edge={:.1}, border={}, max_features={}",
            self.layers_per_octave,
            self.sigma,
            self.max_octaves,
            self.contrast_threshold,
            self.edge_threshold,
            self.border,
            self.max_features
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> FeatureResult<()> {
        let invalid = |msg: &str| Err(FeatureError::InvalidConfig(msg.to_string()));
        if self.layers_per_octave == 0 {
            return invalid("layers_per_octave must be at least 1");
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return invalid("sigma must be positive");
        }
        if !(self.assumed_blur.is_finite() && self.assumed_blur >= 0.0) {
            return invalid("assumed_blur must be non-negative");
        }
        if self.max_octaves == 0 {
            return invalid("max_octaves must be at least 1");
        }
        if !(self.contrast_threshold.is_finite() && self.contrast_threshold >= 0.0) {
            return invalid("contrast_threshold must be non-negative");
        }
        if !(self.edge_threshold.is_finite() && self.edge_threshold >= 1.0) {
            return invalid("edge_threshold must be at least 1");
        }
        if self.border == 0 {
            return invalid("border must be at least 1 pixel");
        }
        Ok(())
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> FeatureResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeatureError::ConfigFormat(e.to_string()))
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> FeatureResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| FeatureError::ConfigFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> FeatureResult<String> {
        toml::to_string_pretty(self).map_err(|e| FeatureError::ConfigFormat(e.to_string()))
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> FeatureResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| FeatureError::ConfigFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.json` or `.toml` file
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> FeatureResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Save configuration as JSON or TOML depending on the extension
    #[cfg(feature = "serde")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> FeatureResult<()> {
        let path = path.as_ref();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.to_json()?,
            _ => self.to_toml()?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }
}
