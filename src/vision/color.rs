// SYNOID Color Conversions
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use crate::vision::farneback::FlowField;
use image::{GrayImage, Luma, Rgb, RgbImage};

// BT.601 luma weights in 14-bit fixed point.
const GRAY_SHIFT: u32 = 14;
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;

/// Hue covers [0, 180) so it fits in a byte.
pub const HUE_RANGE: f32 = 180.0;

/// Sector table mapping (b, g, r) to entries of [v, p, q, t].
const HSV_SECTORS: [[usize; 3]; 6] = [[1, 3, 0], [1, 0, 2], [3, 0, 1], [0, 2, 1], [0, 1, 3], [2, 1, 0]];

#[inline]
pub fn luma(rgb: [u8; 3]) -> u8 {
    let y = rgb[0] as u32 * R_WEIGHT
        + rgb[1] as u32 * G_WEIGHT
        + rgb[2] as u32 * B_WEIGHT
        + (1 << (GRAY_SHIFT - 1));
    (y >> GRAY_SHIFT) as u8
}

/// RGB to single-channel gray with 0.299/0.587/0.114 weights.
pub fn rgb_to_gray(img: &RgbImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    for (src, dst) in img.pixels().zip(out.pixels_mut()) {
        *dst = Luma([luma(src.0)]);
    }
    out
}

/// Convert one 8-bit HSV triple (hue in [0, 180)) to RGB.
pub fn hsv_to_rgb(h: u8, s: u8, v: u8) -> [u8; 3] {
    let s = s as f32 / 255.0;
    let v = v as f32 / 255.0;
    let (r, g, b) = if s == 0.0 {
        (v, v, v)
    } else {
        let mut hue = h as f32 * (6.0 / HUE_RANGE);
        while hue >= 6.0 {
            hue -= 6.0;
        }
        let mut sector = hue.floor() as usize;
        let mut frac = hue - sector as f32;
        if sector >= 6 {
            sector = 0;
            frac = 0.0;
        }
        let tab = [v, v * (1.0 - s), v * (1.0 - s * frac), v * (1.0 - s * (1.0 - frac))];
        let idx = HSV_SECTORS[sector];
        (tab[idx[2]], tab[idx[1]], tab[idx[0]])
    };
    [to_byte(r), to_byte(g), to_byte(b)]
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Min-max normalize into [lo, hi]; a flat input maps to `lo`.
pub fn normalize_min_max(values: &[f32], lo: f32, hi: f32) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(mn, mx), &v| (mn.min(v), mx.max(v)));
    let range = max as f64 - min as f64;
    let scale = if range > f64::EPSILON {
        (hi - lo) as f64 / range
    } else {
        0.0
    };
    let shift = lo as f64 - min as f64 * scale;
    values
        .iter()
        .map(|&v| (v as f64 * scale + shift) as f32)
        .collect()
}

/// Render a flow field as HSV (angle as hue, magnitude as value) converted to RGB.
pub fn flow_to_rgb(flow: &FlowField) -> RgbImage {
    let (w, h) = (flow.width() as u32, flow.height() as u32);
    let (mag, ang) = flow.to_polar();
    let value = normalize_min_max(&mag, 0.0, 255.0);

    let mut out = RgbImage::new(w, h);
    for (i, px) in out.pixels_mut().enumerate() {
        // Byte truncation of hue and value.
        let hue = (ang[i] * 180.0 / std::f32::consts::PI / 2.0).clamp(0.0, HUE_RANGE - 1.0) as u8;
        let val = value[i].clamp(0.0, 255.0) as u8;
        *px = Rgb(hsv_to_rgb(hue, 255, val));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma([0, 0, 0]), 0);
        assert_eq!(luma([255, 255, 255]), 255);
        assert_eq!(luma([255, 0, 0]), 76);
        assert_eq!(luma([0, 255, 0]), 150);
        assert_eq!(luma([0, 0, 255]), 29);
    }

    #[test]
    fn test_hsv_primary_hues() {
        assert_eq!(hsv_to_rgb(0, 255, 255), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(60, 255, 255), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(120, 255, 255), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(30, 255, 255), [255, 255, 0]);
    }

    #[test]
    fn test_hsv_zero_value_is_black() {
        for h in [0u8, 45, 90, 179] {
            assert_eq!(hsv_to_rgb(h, 255, 0), [0, 0, 0]);
        }
        assert_eq!(hsv_to_rgb(10, 0, 200), [200, 200, 200]);
    }

    #[test]
    fn test_normalize_flat_input_is_zero() {
        let out = normalize_min_max(&[3.0, 3.0, 3.0], 0.0, 255.0);
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_spans_range() {
        let out = normalize_min_max(&[1.0, 2.0, 3.0], 0.0, 255.0);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 127.5).abs() < 1e-4);
        assert!((out[2] - 255.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_flow_renders_black() {
        let flow = FlowField::zeros(4, 3);
        let rgb = flow_to_rgb(&flow);
        assert_eq!(rgb.dimensions(), (4, 3));
        assert!(rgb.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
