use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use simsearch_core::{Keypoint, RasterImage};

const MARK: Rgb<u8> = Rgb([255, 0, 0]);

/// Copy of `img` with a circle of the keypoint's scale and an orientation tick per keypoint
pub fn draw_keypoints(img: &RasterImage, keypoints: &[Keypoint]) -> Option<RgbImage> {
    let mut canvas = RgbImage::from_raw(img.width() as u32, img.height() as u32, img.as_bytes().to_vec())?;
    for kp in keypoints {
        let radius = kp.scale.max(3.0);
        draw_hollow_circle_mut(&mut canvas, (kp.x.round() as i32, kp.y.round() as i32), radius.round() as i32, MARK);
        let tip = (kp.x + radius * kp.angle.cos(), kp.y + radius * kp.angle.sin());
        draw_line_segment_mut(&mut canvas, (kp.x, kp.y), tip, MARK);
    }
    Some(canvas)
}
