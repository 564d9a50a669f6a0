use crate::error::{FeatureError, FeatureResult};
use crate::types::GrayImage;
use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use simsearch_core::{RasterError, RasterImage};
use std::io::Cursor;

/// Decoding, size normalisation and colour conversion
pub struct ImagePreprocessing;

impl ImagePreprocessing {
    /// Decode encoded image bytes (format sniffed from content) into an RGB raster
    pub fn decode(bytes: &[u8]) -> FeatureResult<RasterImage> {
        let decoded = image::load_from_memory(bytes)?;
        let rgb = decoded.into_rgb8();
        let (w, h) = rgb.dimensions();
        Ok(RasterImage::new(rgb.into_raw(), w as usize, h as usize)?)
    }

    /// Encode a raster as PNG
    pub fn encode_png(img: &RasterImage) -> FeatureResult<Vec<u8>> {
        let rgb = Self::to_rgb_image(img)?;
        let mut buf = Cursor::new(Vec::new());
        rgb.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    /// Bound the larger side to `max_dimension`, preserving aspect ratio.
    ///
    /// Images already within the bound are returned unchanged.
    pub fn resize(img: &RasterImage, max_dimension: u32) -> FeatureResult<RasterImage> {
        if max_dimension == 0 {
            return Err(FeatureError::InvalidMaxDimension);
        }
        let (w, h) = Self::target_size(img.width(), img.height(), max_dimension as usize);
        if (w, h) == (img.width(), img.height()) {
            return Ok(img.clone());
        }

        let rgb = Self::to_rgb_image(img)?;
        let resized = image::imageops::resize(&rgb, w as u32, h as u32, FilterType::Triangle);
        tracing::trace!(from_w = img.width(), from_h = img.height(), to_w = w, to_h = h, "resized raster");
        Ok(RasterImage::new(resized.into_raw(), w, h)?)
    }

    /// Output size of [`Self::resize`]: the larger side becomes exactly `max_dimension`,
    /// the smaller one is scaled by the same factor and truncated (never below 1)
    pub fn target_size(width: usize, height: usize, max_dimension: usize) -> (usize, usize) {
        let max_side = width.max(height);
        if max_side <= max_dimension || max_dimension == 0 {
            return (width, height);
        }
        let scale = |side: usize| ((side as u64 * max_dimension as u64) / max_side as u64).max(1) as usize;
        if width >= height {
            (max_dimension, scale(height))
        } else {
            (scale(width), max_dimension)
        }
    }

    /// BT.601 luma scaled to `[0, 1]`
    pub fn to_gray(img: &RasterImage) -> GrayImage {
        let data = img
            .as_bytes()
            .chunks_exact(3)
            .map(|px| (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0)
            .collect();
        GrayImage::from_vec(data, img.width(), img.height())
            .unwrap_or_else(|| GrayImage::new(img.width(), img.height()))
    }

    fn to_rgb_image(img: &RasterImage) -> FeatureResult<RgbImage> {
        RgbImage::from_raw(img.width() as u32, img.height() as u32, img.as_bytes().to_vec()).ok_or(
            FeatureError::Raster(RasterError::BufferMismatch {
                expected: img.width() * img.height() * 3,
                actual: img.as_bytes().len(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient_raster(width: usize, height: usize) -> RasterImage {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
            }
        }
        RasterImage::new(data, width, height).unwrap()
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = ImagePreprocessing::decode(b"definitely not an image");
        assert!(matches!(result, Err(ref e) if e.is_decode()));
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(ImagePreprocessing::decode(&[]).is_err());
    }

    #[test]
    fn test_png_round_trip_is_lossless() {
        let img = gradient_raster(23, 17);
        let bytes = ImagePreprocessing::encode_png(&img).unwrap();
        let decoded = ImagePreprocessing::decode(&bytes).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_resize_leaves_small_images_alone() {
        let img = gradient_raster(40, 30);
        let same = ImagePreprocessing::resize(&img, 800).unwrap();
        assert_eq!(same, img);
    }

    #[test]
    fn test_resize_bounds_larger_side() {
        let img = gradient_raster(1000, 500);
        let resized = ImagePreprocessing::resize(&img, 800).unwrap();
        assert_eq!((resized.width(), resized.height()), (800, 400));
        assert_eq!(resized.as_bytes().len(), 800 * 400 * 3);
    }

    #[test]
    fn test_resize_portrait() {
        assert_eq!(ImagePreprocessing::target_size(300, 1200, 800), (200, 800));
        assert_eq!(ImagePreprocessing::target_size(1, 5000, 800), (1, 800));
    }

    #[test]
    fn test_resize_rejects_zero_bound() {
        let img = gradient_raster(10, 10);
        assert!(matches!(
            ImagePreprocessing::resize(&img, 0),
            Err(FeatureError::InvalidMaxDimension)
        ));
    }

    #[test]
    fn test_gray_conversion() {
        let white = RasterImage::filled(4, 4, [255, 255, 255]).unwrap();
        let gray = ImagePreprocessing::to_gray(&white);
        assert!(gray.data().iter().all(|v| (v - 1.0).abs() < 1e-4));

        let black = RasterImage::filled(4, 4, [0, 0, 0]).unwrap();
        assert!(ImagePreprocessing::to_gray(&black).data().iter().all(|&v| v == 0.0));
    }

    proptest! {
        #[test]
        fn prop_target_size_respects_bound_and_aspect(
            width in 1usize..5000,
            height in 1usize..5000,
            max_dimension in 1usize..1200,
        ) {
            let (w, h) = ImagePreprocessing::target_size(width, height, max_dimension);
            let max_side = width.max(height);
            prop_assert!(w.max(h) <= max_dimension);
            prop_assert!(w >= 1 && h >= 1);
            if max_side > max_dimension {
                prop_assert_eq!(w.max(h), max_dimension);
                // cross-multiplied aspect error stays within one output pixel
                let err = (w as i64 * height as i64 - h as i64 * width as i64).abs();
                prop_assert!(err <= max_side as i64, "aspect drift {}", err);
            } else {
                prop_assert_eq!((w, h), (width, height));
            }
        }

        #[test]
        fn prop_resize_output_matches_target(
            width in 1usize..120,
            height in 1usize..120,
            max_dimension in 1u32..64,
        ) {
            let img = gradient_raster(width, height);
            let resized = ImagePreprocessing::resize(&img, max_dimension).unwrap();
            prop_assert!(resized.max_side() <= (max_dimension as usize).max(1));
            prop_assert_eq!(
                (resized.width(), resized.height()),
                ImagePreprocessing::target_size(width, height, max_dimension as usize)
            );
        }
    }
}
