//! Numeric helpers shared by the scale space, refinement and descriptor stages

use crate::types::GrayImage;
use rayon::prelude::*;
use std::f32::consts::TAU;

/// Normalised 1-D Gaussian kernel with radius `ceil(3 * sigma)`
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur with replicated borders
pub fn gaussian_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (w, h) = (img.width(), img.height());

    let mut horizontal = GrayImage::new(w, h);
    horizontal
        .data_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &wk) in kernel.iter().enumerate() {
                    acc += wk * img.get_clamped(x as isize + k as isize - radius, y as isize);
                }
                *out = acc;
            }
        });

    let mut blurred = GrayImage::new(w, h);
    blurred
        .data_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &wk) in kernel.iter().enumerate() {
                    acc += wk * horizontal.get_clamped(x as isize, y as isize + k as isize - radius);
                }
                *out = acc;
            }
        });

    blurred
}

/// Keeps every second pixel in both directions
pub fn decimate(img: &GrayImage) -> GrayImage {
    let (w, h) = ((img.width() / 2).max(1), (img.height() / 2).max(1));
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            out.data_mut()[y * w + x] = img.get(x * 2, y * 2);
        }
    }
    out
}

/// Pixel-wise `a - b`
pub fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for ((o, x), y) in out.data_mut().iter_mut().zip(a.data()).zip(b.data()) {
        *o = x - y;
    }
    out
}

/// Solves `m * x = b` by Cramer's rule; `None` for (near-)singular systems
pub fn solve_3x3(m: [[f32; 3]; 3], b: [f32; 3]) -> Option<[f32; 3]> {
    let det = |m: &[[f32; 3]; 3]| -> f32 {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let d = det(&m);
    if d == 0.0 || !d.is_finite() {
        return None;
    }
    let mut x = [0.0; 3];
    for (col, xi) in x.iter_mut().enumerate() {
        let mut mc = m;
        for row in 0..3 {
            mc[row][col] = b[row];
        }
        *xi = det(&mc) / d;
    }
    Some(x)
}

/// Wraps an angle into `[0, 2pi)`
pub fn wrap_angle(angle: f32) -> f32 {
    let a = angle.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}
