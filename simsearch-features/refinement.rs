use crate::config::ExtractorConfig;
use crate::pyramid::Octave;
use crate::types::{Extremum, GrayImage};
use crate::utils::{solve_3x3, wrap_angle};
use simsearch_core::Keypoint;
use std::f32::consts::TAU;

const MAX_INTERP_STEPS: usize = 5;
const ORI_HIST_BINS: usize = 36;
const ORI_SIGMA_FACTOR: f32 = 1.5;
const ORI_RADIUS_FACTOR: f32 = 3.0 * ORI_SIGMA_FACTOR;
const ORI_PEAK_RATIO: f32 = 0.8;

/// Extremum search, sub-pixel refinement and orientation assignment
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Strict 26-neighbourhood extremum test at DoG layer `layer`
    pub fn is_extremum(dogs: &[GrayImage], layer: usize, x: usize, y: usize) -> bool {
        let value = dogs[layer].get(x, y);
        for img in &dogs[layer - 1..=layer + 1] {
            for yy in y - 1..=y + 1 {
                for xx in x - 1..=x + 1 {
                    if std::ptr::eq(img, &dogs[layer]) && xx == x && yy == y {
                        continue;
                    }
                    let n = img.get(xx, yy);
                    if (value > 0.0 && n >= value) || (value < 0.0 && n <= value) || value == 0.0 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Scan one DoG layer of an octave for candidate extrema and refine them
    pub(crate) fn find_extrema(octave: &Octave, layer: usize, cfg: &ExtractorConfig) -> Vec<Extremum> {
        let (w, h) = (octave.level.width, octave.level.height);
        let border = cfg.border;
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }
        let prefilter = 0.5 * cfg.contrast_threshold / cfg.layers_per_octave as f32;
        let dog = &octave.dogs[layer];

        let mut found = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                if dog.get(x, y).abs() <= prefilter {
                    continue;
                }
                if !Self::is_extremum(&octave.dogs, layer, x, y) {
                    continue;
                }
                if let Some(ext) = Self::refine_extremum(octave, layer, x, y, cfg) {
                    found.push(ext);
                }
            }
        }
        found
    }

    /// Newton iteration on the local 3-D quadratic; rejects unstable, weak and
    /// edge-like extrema
    pub(crate) fn refine_extremum(
        octave: &Octave,
        layer: usize,
        x: usize,
        y: usize,
        cfg: &ExtractorConfig,
    ) -> Option<Extremum> {
        let layers = cfg.layers_per_octave;
        let (w, h) = (octave.level.width, octave.level.height);
        let border = cfg.border;
        let (mut x, mut y, mut layer) = (x as isize, y as isize, layer as isize);

        let mut converged = None;
        for _ in 0..MAX_INTERP_STEPS {
            let (grad, hess) = Self::derivatives(&octave.dogs, layer as usize, x as usize, y as usize);
            let rhs = [-grad[0], -grad[1], -grad[2]];
            let offset = solve_3x3(hess, rhs)?;

            if offset.iter().all(|o| o.abs() < 0.5) {
                converged = Some((grad, hess, offset));
                break;
            }
            if offset.iter().any(|o| o.abs() > (i32::MAX / 3) as f32) {
                return None;
            }

            x += offset[0].round() as isize;
            y += offset[1].round() as isize;
            layer += offset[2].round() as isize;
            if layer < 1
                || layer > layers as isize
                || x < border as isize
                || x >= (w - border) as isize
                || y < border as isize
                || y >= (h - border) as isize
            {
                return None;
            }
        }
        let (grad, hess, offset) = converged?;

        let value = octave.dogs[layer as usize].get(x as usize, y as usize);
        let contrast = value + 0.5 * (grad[0] * offset[0] + grad[1] * offset[1] + grad[2] * offset[2]);
        if contrast.abs() * (layers as f32) < cfg.contrast_threshold {
            return None;
        }

        // principal curvature ratio on the 2x2 spatial Hessian
        let (dxx, dyy, dxy) = (hess[0][0], hess[1][1], hess[0][1]);
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = cfg.edge_threshold;
        if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
            return None;
        }

        Some(Extremum {
            octave: octave.level.index,
            layer: layer as usize,
            x: x as usize,
            y: y as usize,
            offset,
            response: contrast.abs(),
        })
    }

    /// Gradient and Hessian of the DoG stack by finite differences
    fn derivatives(dogs: &[GrayImage], layer: usize, x: usize, y: usize) -> ([f32; 3], [[f32; 3]; 3]) {
        let (prev, cur, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
        let v = cur.get(x, y);

        let dx = (cur.get(x + 1, y) - cur.get(x - 1, y)) * 0.5;
        let dy = (cur.get(x, y + 1) - cur.get(x, y - 1)) * 0.5;
        let ds = (next.get(x, y) - prev.get(x, y)) * 0.5;

        let dxx = cur.get(x + 1, y) + cur.get(x - 1, y) - 2.0 * v;
        let dyy = cur.get(x, y + 1) + cur.get(x, y - 1) - 2.0 * v;
        let dss = next.get(x, y) + prev.get(x, y) - 2.0 * v;
        let dxy = (cur.get(x + 1, y + 1) - cur.get(x - 1, y + 1) - cur.get(x + 1, y - 1)
            + cur.get(x - 1, y - 1))
            * 0.25;
        let dxs = (next.get(x + 1, y) - next.get(x - 1, y) - prev.get(x + 1, y) + prev.get(x - 1, y)) * 0.25;
        let dys = (next.get(x, y + 1) - next.get(x, y - 1) - prev.get(x, y + 1) + prev.get(x, y - 1)) * 0.25;

        (
            [dx, dy, ds],
            [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]],
        )
    }

    /// Dominant gradient orientations (radians) around `(x, y)` of a gaussian image
    pub fn compute_orientations(img: &GrayImage, x: usize, y: usize, octave_sigma: f32) -> Vec<f32> {
        let hist = Self::orientation_histogram(img, x, y, octave_sigma);
        let max = hist.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let n = ORI_HIST_BINS;
        let mut angles = Vec::new();
        for i in 0..n {
            let left = hist[(i + n - 1) % n];
            let right = hist[(i + 1) % n];
            let c = hist[i];
            if c > left && c > right && c >= ORI_PEAK_RATIO * max {
                let denom = left - 2.0 * c + right;
                let shift = if denom != 0.0 { 0.5 * (left - right) / denom } else { 0.0 };
                let bin = i as f32 + shift;
                angles.push(wrap_angle(bin * TAU / n as f32));
            }
        }
        angles
    }

    /// Smoothed 36-bin histogram of Gaussian-weighted gradient magnitudes
    fn orientation_histogram(img: &GrayImage, x: usize, y: usize, octave_sigma: f32) -> [f32; ORI_HIST_BINS] {
        let n = ORI_HIST_BINS;
        let radius = (ORI_RADIUS_FACTOR * octave_sigma).round() as isize;
        let weight_sigma = ORI_SIGMA_FACTOR * octave_sigma;
        let denom = 2.0 * weight_sigma * weight_sigma;
        let (w, h) = (img.width() as isize, img.height() as isize);

        let mut raw = [0.0f32; ORI_HIST_BINS];
        for dy in -radius..=radius {
            let py = y as isize + dy;
            if py <= 0 || py >= h - 1 {
                continue;
            }
            for dx in -radius..=radius {
                let px = x as isize + dx;
                if px <= 0 || px >= w - 1 {
                    continue;
                }
                let (gx, gy) = img.gradient(px as usize, py as usize);
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let theta = wrap_angle(gy.atan2(gx));
                let weight = (-((dx * dx + dy * dy) as f32) / denom).exp();
                let bin = ((theta * n as f32 / TAU).round() as usize) % n;
                raw[bin] += weight * magnitude;
            }
        }

        // circular [1 4 6 4 1] / 16 smoothing
        let mut hist = [0.0f32; ORI_HIST_BINS];
        for (i, out) in hist.iter_mut().enumerate() {
            *out = (raw[(i + n - 2) % n] + raw[(i + 2) % n]) * (1.0 / 16.0)
                + (raw[(i + n - 1) % n] + raw[(i + 1) % n]) * (4.0 / 16.0)
                + raw[i] * (6.0 / 16.0);
        }
        hist
    }

    /// Remove exact duplicates and order keypoints deterministically
    pub fn deduplicate<T>(features: &mut Vec<(Keypoint, T)>) {
        features.sort_by(|(a, _), (b, _)| {
            a.x.total_cmp(&b.x)
                .then(a.y.total_cmp(&b.y))
                .then(a.scale.total_cmp(&b.scale))
                .then(a.angle.total_cmp(&b.angle))
        });
        features.dedup_by(|(a, _), (b, _)| a.x == b.x && a.y == b.y && a.scale == b.scale && a.angle == b.angle);
    }

    /// Keep the `max_features` strongest responses (0 keeps all), preserving order
    pub fn retain_best<T>(features: &mut Vec<(Keypoint, T)>, max_features: usize) {
        if max_features == 0 || features.len() <= max_features {
            return;
        }
        let mut ranked: Vec<usize> = (0..features.len()).collect();
        ranked.sort_by(|&a, &b| features[b].0.response.total_cmp(&features[a].0.response).then(a.cmp(&b)));
        let mut keep = vec![false; features.len()];
        for &i in &ranked[..max_features] {
            keep[i] = true;
        }
        let mut i = 0;
        features.retain(|_| {
            let k = keep[i];
            i += 1;
            k
        });
    }
}
