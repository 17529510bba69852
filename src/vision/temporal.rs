// SYNOID Temporal Loss
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use crate::error::{FlowError, Result};
use crate::vision::color::{flow_to_rgb, rgb_to_gray};
use crate::vision::farneback::{farneback, FarnebackParams};
use image::{GrayImage, Luma, RgbImage};
use std::path::Path;
use tracing::{debug, info};

/// Flow intensity above this marks a pixel as moving.
pub const MOTION_THRESHOLD: f32 = 0.5;

/// Binary per-pixel weight: 1 where no motion was rendered, 0 where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMask(GrayImage);

impl FlowMask {
    /// Threshold a rendered flow-intensity image.
    pub fn from_intensity(intensity: &GrayImage) -> Self {
        let (w, h) = intensity.dimensions();
        let mut mask = GrayImage::new(w, h);
        for (src, dst) in intensity.pixels().zip(mask.pixels_mut()) {
            *dst = Luma([if src.0[0] as f32 > MOTION_THRESHOLD { 0 } else { 1 }]);
        }
        Self(mask)
    }

    /// Build a mask from raw 0/1 values; anything non-zero becomes 1.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        Self(GrayImage::from_fn(width, height, |x, y| Luma([f(x, y) as u8])))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y).0[0]
    }

    /// Mask values in row-major order.
    pub fn values(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Fraction of pixels kept (mask = 1).
    pub fn coverage(&self) -> f64 {
        let total = self.values().len();
        if total == 0 {
            return 0.0;
        }
        self.values().iter().filter(|&&v| v == 1).count() as f64 / total as f64
    }

    /// Stretch 0/1 to 0/255 for viewing.
    pub fn to_visible(&self) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| Luma([self.get(x, y) * 255]))
    }

    pub fn into_inner(self) -> GrayImage {
        self.0
    }
}

/// Load an image from disk as an 8-bit RGB frame.
pub fn load_frame(path: &Path) -> Result<RgbImage> {
    debug!("[EYES] Loading frame: {:?}", path);
    let img = image::open(path)?;
    Ok(img.to_rgb8())
}

/// Estimate motion from `previous` to `current` with the default Farneback parameters.
///
/// Returns the HSV-rendered flow as RGB and the motion mask derived from it.
pub fn optical_flow(current: &RgbImage, previous: &RgbImage) -> Result<(RgbImage, FlowMask)> {
    optical_flow_with(current, previous, &FarnebackParams::default())
}

pub fn optical_flow_with(
    current: &RgbImage,
    previous: &RgbImage,
    params: &FarnebackParams,
) -> Result<(RgbImage, FlowMask)> {
    FlowError::check_dimensions(current.dimensions(), previous.dimensions())?;

    let next = rgb_to_gray(current);
    let prvs = rgb_to_gray(previous);
    let flow = farneback(&prvs, &next, params)?;

    let rgb = flow_to_rgb(&flow);
    let intensity = rgb_to_gray(&rgb);
    let mask = FlowMask::from_intensity(&intensity);

    debug!("[FLOW] Mask coverage: {:.4}", mask.coverage());
    Ok((rgb, mask))
}

/// Mean of mask-weighted squared differences over every channel of every pixel.
pub fn masked_squared_error(current: &RgbImage, previous: &RgbImage, mask: &FlowMask) -> Result<f64> {
    FlowError::check_dimensions(current.dimensions(), previous.dimensions())?;
    FlowError::check_dimensions(current.dimensions(), mask.dimensions())?;

    let mut total = 0.0f64;
    for ((p1, p2), &m) in current.pixels().zip(previous.pixels()).zip(mask.values()) {
        if m == 0 {
            continue;
        }
        for c in 0..3 {
            let d = p1[c] as f64 - p2[c] as f64;
            total += m as f64 * d * d;
        }
    }

    let count = current.as_raw().len() as f64;
    Ok(total / count)
}

/// Temporal loss between two consecutive frames using the default flow parameters.
pub fn compute_temporal_loss(current: &RgbImage, previous: &RgbImage) -> Result<f64> {
    compute_temporal_loss_with(current, previous, &FarnebackParams::default())
}

pub fn compute_temporal_loss_with(
    current: &RgbImage,
    previous: &RgbImage,
    params: &FarnebackParams,
) -> Result<f64> {
    let (_, mask) = optical_flow_with(current, previous, params)?;
    let loss = masked_squared_error(current, previous, &mask)?;
    info!(
        "[LOSS] Temporal loss {:.6} ({}x{}, mask coverage {:.2}%)",
        loss,
        current.width(),
        current.height(),
        mask.coverage() * 100.0
    );
    Ok(loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_mask_threshold_is_inverted() {
        let intensity = GrayImage::from_raw(3, 1, vec![0, 1, 200]).expect("buffer");
        let mask = FlowMask::from_intensity(&intensity);
        assert_eq!(mask.values(), &[1, 0, 0]);
        assert!((mask.coverage() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_error_counts_all_channels() {
        let a = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        let b = RgbImage::from_pixel(2, 1, Rgb([13, 10, 6]));
        let keep_all = FlowMask::from_fn(2, 1, |_, _| true);
        // per pixel: 9 + 0 + 16 = 25, six elements
        let loss = masked_squared_error(&a, &b, &keep_all).expect("loss");
        assert!((loss - 50.0 / 6.0).abs() < 1e-12);

        let keep_first = FlowMask::from_fn(2, 1, |x, _| x == 0);
        let loss = masked_squared_error(&a, &b, &keep_first).expect("loss");
        assert!((loss - 25.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_error_has_no_byte_wraparound() {
        let a = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let b = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let mask = FlowMask::from_fn(1, 1, |_, _| true);
        let loss = masked_squared_error(&a, &b, &mask).expect("loss");
        assert_eq!(loss, 255.0 * 255.0);
    }

    #[test]
    fn test_mask_size_must_match() {
        let a = RgbImage::new(4, 4);
        let mask = FlowMask::from_fn(3, 4, |_, _| true);
        assert!(matches!(
            masked_squared_error(&a, &a, &mask),
            Err(FlowError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_visible_mask_scales_to_white() {
        let mask = FlowMask::from_fn(2, 1, |x, _| x == 1);
        assert_eq!(mask.to_visible().as_raw(), &vec![0, 255]);
    }
}
