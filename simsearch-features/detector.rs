use crate::config::ExtractorConfig;
use crate::descriptor::DescriptorGenerator;
use crate::error::{FeatureError, FeatureResult};
use crate::preprocessing::ImagePreprocessing;
use crate::pyramid::{Octave, ScaleSpace};
use crate::refinement::KeypointRefinement;
use crate::types::GrayImage;
use rayon::prelude::*;
use simsearch_core::{Descriptor, DescriptorSet, Keypoint, RasterImage};
use tracing::debug;

/// Scale-invariant keypoint detector and descriptor extractor
#[derive(Debug, Clone)]
pub struct SiftExtractor {
    cfg: ExtractorConfig,
    generator: DescriptorGenerator,
}

impl SiftExtractor {
    /// Creates a new extractor with validation
    pub fn new(cfg: ExtractorConfig) -> FeatureResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            generator: DescriptorGenerator::new(),
        })
    }

    /// Detect keypoints and compute their descriptors on an RGB raster
    pub fn extract(&self, img: &RasterImage) -> FeatureResult<DescriptorSet> {
        let gray = ImagePreprocessing::to_gray(img);
        self.extract_gray(&gray)
    }

    /// Same as [`extract`](Self::extract) on an already converted intensity image
    pub fn extract_gray(&self, gray: &GrayImage) -> FeatureResult<DescriptorSet> {
        let space = ScaleSpace::build(gray, &self.cfg);
        if space.is_empty() {
            debug!(width = gray.width(), height = gray.height(), "image too small for any octave");
            return Ok(DescriptorSet::empty());
        }

        let layers = self.cfg.layers_per_octave;
        let jobs: Vec<(usize, usize)> = (0..space.octaves().len())
            .flat_map(|o| (1..=layers).map(move |l| (o, l)))
            .collect();

        let mut features: Vec<(Keypoint, Descriptor)> = jobs
            .into_par_iter()
            .flat_map_iter(|(o, l)| self.describe_layer(&space.octaves()[o], l))
            .collect();

        if let Some((kp, _)) = features.iter().find(|(_, d)| d.iter().any(|v| !v.is_finite())) {
            return Err(FeatureError::Extraction(format!(
                "non-finite descriptor at ({:.1}, {:.1})",
                kp.x, kp.y
            )));
        }

        KeypointRefinement::deduplicate(&mut features);
        KeypointRefinement::retain_best(&mut features, self.cfg.max_features);
        debug!(
            octaves = space.octaves().len(),
            keypoints = features.len(),
            "extracted features"
        );

        let (keypoints, descriptors) = features.into_iter().unzip();
        Ok(DescriptorSet::new(keypoints, descriptors))
    }

    /// Keypoints and descriptors found on one DoG layer of an octave
    fn describe_layer(&self, octave: &Octave, layer: usize) -> Vec<(Keypoint, Descriptor)> {
        let layers = self.cfg.layers_per_octave;
        let step = octave.level.step;
        let mut out = Vec::new();

        for ext in KeypointRefinement::find_extrema(octave, layer, &self.cfg) {
            let sigma = ext.octave_sigma(self.cfg.sigma, layers);
            let img = &octave.gaussians[ext.layer];
            let (ox, oy) = (ext.x as f32 + ext.offset[0], ext.y as f32 + ext.offset[1]);

            for angle in KeypointRefinement::compute_orientations(img, ext.x, ext.y, sigma) {
                let descriptor = self.generator.describe(img, ox, oy, sigma, angle);
                let keypoint = Keypoint {
                    x: ox * step,
                    y: oy * step,
                    scale: sigma * step,
                    angle,
                    response: ext.response,
                    octave: ext.octave,
                    layer: ext.layer as f32 + ext.offset[2],
                };
                out.push((keypoint, descriptor));
            }
        }
        out
    }

    /// Get extractor configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }
}

impl Default for SiftExtractor {
    fn default() -> Self {
        Self {
            cfg: ExtractorConfig::default(),
            generator: DescriptorGenerator::new(),
        }
    }
}
