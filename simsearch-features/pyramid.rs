use crate::config::ExtractorConfig;
use crate::types::{GrayImage, OctaveLevel};
use crate::utils::{decimate, gaussian_blur, subtract};
use rayon::prelude::*;

/// Smallest octave side that still leaves room for extrema after the border
const MIN_OCTAVE_SIDE: usize = 16;

/// Gaussian and difference-of-Gaussian images of one octave
pub struct Octave {
    pub level: OctaveLevel,
    /// `layers + 3` progressively blurred images
    pub gaussians: Vec<GrayImage>,
    /// `layers + 2` differences of adjacent gaussians
    pub dogs: Vec<GrayImage>,
}

/// Gaussian scale space used for multi-scale detection
pub struct ScaleSpace {
    octaves: Vec<Octave>,
}

impl ScaleSpace {
    /// Number of octaves for an image; 0 when the image is too small to analyse
    pub fn octave_count(width: usize, height: usize, max_octaves: usize) -> usize {
        let min_side = width.min(height);
        if min_side < MIN_OCTAVE_SIDE {
            return 0;
        }
        let count = (min_side as f32).log2().floor() as usize - 3;
        count.clamp(1, max_octaves.max(1))
    }

    /// Incremental blur applied to go from gaussian `i - 1` to gaussian `i`
    pub fn layer_sigmas(sigma: f32, layers: usize) -> Vec<f32> {
        let k = 2f32.powf(1.0 / layers as f32);
        let mut sigmas = Vec::with_capacity(layers + 3);
        sigmas.push(sigma);
        for i in 1..layers + 3 {
            let prev = k.powi(i as i32 - 1) * sigma;
            let total = prev * k;
            sigmas.push((total * total - prev * prev).sqrt());
        }
        sigmas
    }

    /// Build the full scale space from a base gray image
    pub fn build(img: &GrayImage, cfg: &ExtractorConfig) -> Self {
        let n_octaves = Self::octave_count(img.width(), img.height(), cfg.max_octaves);
        let sigmas = Self::layer_sigmas(cfg.sigma, cfg.layers_per_octave);
        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);

        for index in 0..n_octaves {
            let first = match octaves.last() {
                None => {
                    let initial = (cfg.sigma * cfg.sigma - cfg.assumed_blur * cfg.assumed_blur).max(0.01).sqrt();
                    gaussian_blur(img, initial)
                }
                // seeded from the layer whose blur is twice the base sigma
                Some(prev) => decimate(&prev.gaussians[cfg.layers_per_octave]),
            };

            let mut gaussians = Vec::with_capacity(sigmas.len());
            gaussians.push(first);
            for &s in &sigmas[1..] {
                let next = gaussian_blur(gaussians.last().unwrap_or(img), s);
                gaussians.push(next);
            }

            let dogs: Vec<GrayImage> = gaussians
                .par_windows(2)
                .map(|pair| subtract(&pair[1], &pair[0]))
                .collect();

            let level = OctaveLevel {
                index,
                step: 2f32.powi(index as i32),
                width: gaussians[0].width(),
                height: gaussians[0].height(),
            };
            octaves.push(Octave { level, gaussians, dogs });
        }

        Self { octaves }
    }

    pub fn octaves(&self) -> &[Octave] {
        &self.octaves
    }

    pub fn is_empty(&self) -> bool {
        self.octaves.is_empty()
    }
}
