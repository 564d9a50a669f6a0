use crate::types::GrayImage;
use crate::utils::wrap_angle;
use simsearch_core::{Descriptor, DESCRIPTOR_LEN};
use std::f32::consts::{SQRT_2, TAU};

/// Spatial cells per side
const GRID: usize = 4;
/// Orientation bins per cell
const BINS: usize = 8;
/// Cell width in units of the keypoint sigma
const CELL_SCALE: f32 = 3.0;
/// Per-element cap applied before renormalisation
const MAGNITUDE_CLIP: f32 = 0.2;

/// Gradient-histogram descriptors computed in the keypoint's rotated frame
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorGenerator;

impl DescriptorGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Describe the neighbourhood of `(x, y)` (octave coordinates) of a gaussian image
    pub fn describe(&self, img: &GrayImage, x: f32, y: f32, octave_sigma: f32, angle: f32) -> Descriptor {
        let d = GRID as isize;
        let n = BINS;
        let cell_width = CELL_SCALE * octave_sigma;
        let diag = ((img.width().pow(2) + img.height().pow(2)) as f32).sqrt();
        let radius = (cell_width * SQRT_2 * (GRID + 1) as f32 * 0.5).round().min(diag) as isize;
        let (cos_t, sin_t) = (angle.cos() / cell_width, angle.sin() / cell_width);
        let exp_scale = -1.0 / (GRID as f32 * GRID as f32 * 0.5);
        let bins_per_rad = n as f32 / TAU;

        // (GRID + 2)^2 cells of (BINS + 2) bins; the padding absorbs interpolation spill
        let row_stride = (GRID + 2) * (n + 2);
        let mut hist = vec![0.0f32; (GRID + 2) * row_stride];

        let (cx, cy) = (x.round() as isize, y.round() as isize);
        let (w, h) = (img.width() as isize, img.height() as isize);

        for i in -radius..=radius {
            for j in -radius..=radius {
                let x_rot = j as f32 * cos_t + i as f32 * sin_t;
                let y_rot = -(j as f32) * sin_t + i as f32 * cos_t;
                let rbin = y_rot + (GRID / 2) as f32 - 0.5;
                let cbin = x_rot + (GRID / 2) as f32 - 0.5;
                if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32 {
                    continue;
                }
                let (px, py) = (cx + j, cy + i);
                if px <= 0 || px >= w - 1 || py <= 0 || py >= h - 1 {
                    continue;
                }

                let (gx, gy) = img.gradient(px as usize, py as usize);
                let weight = ((x_rot * x_rot + y_rot * y_rot) * exp_scale).exp();
                let magnitude = (gx * gx + gy * gy).sqrt() * weight;
                if magnitude == 0.0 {
                    continue;
                }
                let obin = wrap_angle(gy.atan2(gx) - angle) * bins_per_rad;

                // trilinear distribution over (row, col, orientation)
                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
                let o0 = (o0 as usize) % n;
                let base = (r0 as isize + 1) as usize * row_stride + (c0 as isize + 1) as usize * (n + 2) + o0;

                for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
                    for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                        for (dn, wo) in [(0, 1.0 - fo), (1, fo)] {
                            hist[base + dr * row_stride + dc * (n + 2) + dn] += magnitude * wr * wc * wo;
                        }
                    }
                }
            }
        }

        let mut desc = [0.0f32; DESCRIPTOR_LEN];
        for r in 0..GRID {
            for c in 0..GRID {
                let idx = (r + 1) * row_stride + (c + 1) * (n + 2);
                // fold the wrap-around bins back onto 0 and 1
                hist[idx] += hist[idx + n];
                hist[idx + 1] += hist[idx + n + 1];
                let dst = (r * GRID + c) * n;
                desc[dst..dst + n].copy_from_slice(&hist[idx..idx + n]);
            }
        }

        Self::normalize(&mut desc);
        desc
    }

    /// Unit-normalise, clip large components, renormalise
    pub fn normalize(desc: &mut Descriptor) {
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return;
        }
        let cap = MAGNITUDE_CLIP * norm;
        for v in desc.iter_mut() {
            *v = v.min(cap);
        }
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
        for v in desc.iter_mut() {
            *v /= norm;
        }
    }
}
