// SYNOID Farneback Optical Flow
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Dense two-frame motion estimation by polynomial expansion
// (G. Farneback, "Two-Frame Motion Estimation Based on Polynomial Expansion", 2003).

use crate::error::{FlowError, Result};
use crate::vision::plane::Plane;
use image::GrayImage;
use nalgebra::Matrix6;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Levels stop once either side of the scaled image would drop below this.
const MIN_PYRAMID_SIZE: f64 = 32.0;

/// Width of the attenuated frame around the image edge.
const BORDER: usize = 5;
const BORDER_WEIGHTS: [f32; BORDER] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

/// Tuning knobs of the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarnebackParams {
    /// Scale between consecutive pyramid levels, in (0, 1)
    pub pyr_scale: f64,
    /// Number of extra pyramid levels; 0 means the full-resolution image only
    pub levels: usize,
    /// Side of the box window the flow update averages over
    pub win_size: usize,
    /// Flow updates per pyramid level
    pub iterations: usize,
    /// Neighbourhood radius of the polynomial fit
    pub poly_n: usize,
    /// Gaussian sigma weighting the polynomial fit
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pyr_scale > 0.0 && self.pyr_scale < 1.0) {
            return Err(FlowError::invalid_params(format!(
                "pyr_scale must be in (0, 1), got {}",
                self.pyr_scale
            )));
        }
        if self.win_size == 0 {
            return Err(FlowError::invalid_params("win_size must be at least 1"));
        }
        if self.iterations == 0 {
            return Err(FlowError::invalid_params("iterations must be at least 1"));
        }
        if self.poly_n == 0 {
            return Err(FlowError::invalid_params("poly_n must be at least 1"));
        }
        if !(self.poly_sigma > 0.0) {
            return Err(FlowError::invalid_params(format!(
                "poly_sigma must be positive, got {}",
                self.poly_sigma
            )));
        }
        Ok(())
    }

    /// Number of levels actually built for an image of this size.
    pub fn pyramid_depth(&self, width: u32, height: u32) -> usize {
        let mut scale = 1.0;
        let mut depth = 0;
        while depth < self.levels {
            scale *= self.pyr_scale;
            if (width as f64) * scale < MIN_PYRAMID_SIZE || (height as f64) * scale < MIN_PYRAMID_SIZE {
                break;
            }
            depth += 1;
        }
        depth
    }
}

/// Per-pixel displacement (dx, dy) from the previous frame to the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    dx: Plane,
    dy: Plane,
}

impl FlowField {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            dx: Plane::zeros(width, height),
            dy: Plane::zeros(width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.dx.width
    }

    pub fn height(&self) -> usize {
        self.dx.height
    }

    /// Displacement at a pixel.
    pub fn at(&self, x: usize, y: usize) -> (f32, f32) {
        (self.dx.at(x, y), self.dy.at(x, y))
    }

    /// Iterate displacements in row-major order.
    pub fn vectors(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.dx.data.iter().copied().zip(self.dy.data.iter().copied())
    }

    /// Magnitude and angle (radians in [0, 2pi)) of every vector.
    pub fn to_polar(&self) -> (Vec<f32>, Vec<f32>) {
        self.vectors()
            .map(|(x, y)| {
                let mag = (x * x + y * y).sqrt();
                let mut ang = y.atan2(x);
                if ang < 0.0 {
                    ang += std::f32::consts::TAU;
                }
                if ang >= std::f32::consts::TAU {
                    ang = 0.0;
                }
                (mag, ang)
            })
            .unzip()
    }

    /// Upsample a coarse level's flow to the next level's size.
    fn upscaled(&self, width: usize, height: usize, factor: f32) -> Self {
        let mut dx = self.dx.resize(width, height);
        let mut dy = self.dy.resize(width, height);
        dx.scale(factor);
        dy.scale(factor);
        Self { dx, dy }
    }

    fn set(&mut self, idx: usize, dx: f32, dy: f32) {
        self.dx.data[idx] = dx;
        self.dy.data[idx] = dy;
    }
}

/// Gaussian-weighted basis of the polynomial fit.
struct PolyBasis {
    n: usize,
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    ig11: f64,
    ig03: f64,
    ig33: f64,
    ig55: f64,
}

impl PolyBasis {
    fn new(n: usize, sigma: f64) -> Result<Self> {
        let len = 2 * n + 1;
        let mut g = vec![0.0f32; len];
        let mut xg = vec![0.0f32; len];
        let mut xxg = vec![0.0f32; len];

        let mut sum = 0.0f64;
        for (i, gi) in g.iter_mut().enumerate() {
            let x = i as f64 - n as f64;
            *gi = (-(x * x) / (2.0 * sigma * sigma)).exp() as f32;
            sum += *gi as f64;
        }
        let inv = 1.0 / sum;
        for i in 0..len {
            let x = i as f32 - n as f32;
            g[i] = (g[i] as f64 * inv) as f32;
            xg[i] = x * g[i];
            xxg[i] = x * x * g[i];
        }

        let mut gm = Matrix6::<f64>::zeros();
        for yi in 0..len {
            for xi in 0..len {
                let x = xi as f64 - n as f64;
                let y = yi as f64 - n as f64;
                let w = g[yi] as f64 * g[xi] as f64;
                gm[(0, 0)] += w;
                gm[(1, 1)] += w * x * x;
                gm[(3, 3)] += w * x * x * x * x;
                gm[(5, 5)] += w * x * x * y * y;
            }
        }
        let g11 = gm[(1, 1)];
        gm[(0, 3)] = g11;
        gm[(0, 4)] = g11;
        gm[(3, 0)] = g11;
        gm[(4, 0)] = g11;
        gm[(2, 2)] = g11;
        gm[(4, 4)] = gm[(3, 3)];
        gm[(3, 4)] = gm[(5, 5)];
        gm[(4, 3)] = gm[(5, 5)];

        let inv_g = gm.cholesky().map(|c| c.inverse()).ok_or_else(|| {
            FlowError::invalid_params(format!(
                "polynomial basis is singular for poly_n={} poly_sigma={}",
                n, sigma
            ))
        })?;

        Ok(Self {
            n,
            g,
            xg,
            xxg,
            ig11: inv_g[(1, 1)],
            ig03: inv_g[(0, 3)],
            ig33: inv_g[(3, 3)],
            ig55: inv_g[(5, 5)],
        })
    }

    /// Fit a quadratic around every pixel.
    ///
    /// Coefficients per pixel: [b_y, b_x, a_yy, a_xx, a_xy].
    fn expand(&self, src: &Plane) -> Vec<[f32; 5]> {
        let (w, h) = (src.width, src.height);
        let n = self.n;
        let mut row = vec![[0.0f32; 3]; w];
        let mut out = vec![[0.0f32; 5]; w * h];

        for y in 0..h {
            let g0 = self.g[n];
            for (cell, &v) in row.iter_mut().zip(src.row(y)) {
                *cell = [v * g0, 0.0, 0.0];
            }
            for k in 1..=n {
                let (gk, xgk, xxgk) = (self.g[n + k], self.xg[n + k], self.xxg[n + k]);
                let up = src.row(y.saturating_sub(k));
                let down = src.row((y + k).min(h - 1));
                for x in 0..w {
                    let p = up[x] + down[x];
                    row[x][0] += gk * p;
                    row[x][1] += xgk * (down[x] - up[x]);
                    row[x][2] += xxgk * p;
                }
            }

            for x in 0..w {
                let c = row[x];
                let g0 = g0 as f64;
                let mut b1 = c[0] as f64 * g0;
                let mut b2 = 0.0f64;
                let mut b3 = c[1] as f64 * g0;
                let mut b4 = 0.0f64;
                let mut b5 = c[2] as f64 * g0;
                let mut b6 = 0.0f64;
                for k in 1..=n {
                    let l = row[x.saturating_sub(k)];
                    let r = row[(x + k).min(w - 1)];
                    let (gk, xgk, xxgk) = (
                        self.g[n + k] as f64,
                        self.xg[n + k] as f64,
                        self.xxg[n + k] as f64,
                    );
                    let tg = (r[0] + l[0]) as f64;
                    b1 += tg * gk;
                    b4 += tg * xxgk;
                    b2 += (r[0] - l[0]) as f64 * xgk;
                    b3 += (r[1] + l[1]) as f64 * gk;
                    b6 += (r[1] - l[1]) as f64 * xgk;
                    b5 += (r[2] + l[2]) as f64 * gk;
                }
                out[y * w + x] = [
                    (b3 * self.ig11) as f32,
                    (b2 * self.ig11) as f32,
                    (b1 * self.ig03 + b5 * self.ig33) as f32,
                    (b1 * self.ig03 + b4 * self.ig33) as f32,
                    (b6 * self.ig55) as f32,
                ];
            }
        }
        out
    }
}

/// Edge attenuation for a coordinate, 1.0 away from the border.
#[inline]
fn border_weight(i: usize, len: usize) -> f32 {
    let mut w = 1.0;
    if i < BORDER {
        w *= BORDER_WEIGHTS[i];
    }
    if i + BORDER >= len {
        w *= BORDER_WEIGHTS[len - i - 1];
    }
    w
}

/// Rebuild the normal-equation terms for rows `y0..y1` from the current flow.
///
/// Per pixel: [G11, G12, G22, h1, h2].
fn update_matrices(
    r0: &[[f32; 5]],
    r1: &[[f32; 5]],
    flow: &FlowField,
    m: &mut [[f32; 5]],
    y0: usize,
    y1: usize,
) {
    let (w, h) = (flow.width(), flow.height());

    for y in y0..y1 {
        for x in 0..w {
            let idx = y * w + x;
            let (dx, dy) = flow.at(x, y);
            let fx = x as f32 + dx;
            let fy = y as f32 + dy;
            let x1 = fx.floor();
            let y1f = fy.floor();
            let (tx, ty) = (fx - x1, fy - y1f);
            let p = &r0[idx];

            let (s2, s3, r4, r5, r6) =
                if x1 >= 0.0 && y1f >= 0.0 && x1 < (w - 1) as f32 && y1f < (h - 1) as f32 {
                    let (xi, yi) = (x1 as usize, y1f as usize);
                    let a00 = (1.0 - tx) * (1.0 - ty);
                    let a01 = tx * (1.0 - ty);
                    let a10 = (1.0 - tx) * ty;
                    let a11 = tx * ty;
                    let q00 = &r1[yi * w + xi];
                    let q01 = &r1[yi * w + xi + 1];
                    let q10 = &r1[(yi + 1) * w + xi];
                    let q11 = &r1[(yi + 1) * w + xi + 1];
                    let sample =
                        |c: usize| a00 * q00[c] + a01 * q01[c] + a10 * q10[c] + a11 * q11[c];
                    (
                        sample(0),
                        sample(1),
                        (p[2] + sample(2)) * 0.5,
                        (p[3] + sample(3)) * 0.5,
                        (p[4] + sample(4)) * 0.25,
                    )
                } else {
                    (0.0, 0.0, p[2], p[3], p[4] * 0.5)
                };

            let mut r2 = (p[0] - s2) * 0.5 + r4 * dy + r6 * dx;
            let mut r3 = (p[1] - s3) * 0.5 + r6 * dy + r5 * dx;
            let (mut r4, mut r5, mut r6) = (r4, r5, r6);
            if x < BORDER || x + BORDER >= w || y < BORDER || y + BORDER >= h {
                let s = border_weight(x, w) * border_weight(y, h);
                r2 *= s;
                r3 *= s;
                r4 *= s;
                r5 *= s;
                r6 *= s;
            }

            m[idx] = [
                r4 * r4 + r6 * r6,
                (r4 + r5) * r6,
                r5 * r5 + r6 * r6,
                r4 * r2 + r6 * r3,
                r6 * r2 + r5 * r3,
            ];
        }
    }
}

/// Solve the box-averaged normal equations for a new flow estimate.
fn update_flow_blur(
    r0: &[[f32; 5]],
    r1: &[[f32; 5]],
    flow: &mut FlowField,
    m: &mut [[f32; 5]],
    block_size: usize,
    refresh_matrices: bool,
) {
    let (w, h) = (flow.width(), flow.height());
    let half = block_size / 2;
    let scale = 1.0 / (block_size * block_size) as f64;

    let mut vsum = vec![[0.0f64; 5]; w];
    for y in 0..h {
        for (x, acc) in vsum.iter_mut().enumerate() {
            let mut s = [0.0f64; 5];
            for k in 0..block_size {
                let sy = (y + k).saturating_sub(half).min(h - 1);
                let cell = &m[sy * w + x];
                for c in 0..5 {
                    s[c] += cell[c] as f64;
                }
            }
            for c in 0..5 {
                s[c] *= scale;
            }
            *acc = s;
        }

        for x in 0..w {
            let mut s = [0.0f64; 5];
            for k in 0..block_size {
                let sx = (x + k).saturating_sub(half).min(w - 1);
                for c in 0..5 {
                    s[c] += vsum[sx][c];
                }
            }
            let [g11, g12, g22, h1, h2] = s;
            let idet = 1.0 / (g11 * g22 - g12 * g12 + 1e-3);
            flow.set(
                y * w + x,
                ((g11 * h2 - g12 * h1) * idet) as f32,
                ((g22 * h1 - g12 * h2) * idet) as f32,
            );
        }
    }

    if refresh_matrices {
        update_matrices(r0, r1, flow, m, 0, h);
    }
}

/// Estimate dense flow from `previous` to `current`.
///
/// `previous(y, x)` is approximately `current(y + dy, x + dx)`.
pub fn farneback(previous: &GrayImage, current: &GrayImage, params: &FarnebackParams) -> Result<FlowField> {
    params.validate()?;
    FlowError::check_dimensions(previous.dimensions(), current.dimensions())?;

    let (width, height) = previous.dimensions();
    let depth = params.pyramid_depth(width, height);
    let basis = PolyBasis::new(params.poly_n, params.poly_sigma)?;
    let prev0 = Plane::from_gray(previous);
    let next0 = Plane::from_gray(current);

    debug!(
        "[FLOW] Farneback {}x{} with {} pyramid level(s), window {}",
        width,
        height,
        depth + 1,
        params.win_size
    );

    let mut coarse: Option<FlowField> = None;
    for level in (0..=depth).rev() {
        let scale = params.pyr_scale.powi(level as i32);
        let sigma = (1.0 / scale - 1.0) * 0.5;
        let ksize = (((sigma * 5.0).round() as usize) | 1).max(3);
        let lw = ((width as f64 * scale).round() as usize).max(1);
        let lh = ((height as f64 * scale).round() as usize).max(1);

        let mut flow = match coarse.take() {
            Some(prev) => prev.upscaled(lw, lh, (1.0 / params.pyr_scale) as f32),
            None => FlowField::zeros(lw, lh),
        };

        let r0 = basis.expand(&prev0.gaussian_blur(ksize, sigma).resize(lw, lh));
        let r1 = basis.expand(&next0.gaussian_blur(ksize, sigma).resize(lw, lh));

        let mut m = vec![[0.0f32; 5]; lw * lh];
        update_matrices(&r0, &r1, &flow, &mut m, 0, lh);
        for i in 0..params.iterations {
            update_flow_blur(&r0, &r1, &mut flow, &mut m, params.win_size, i + 1 < params.iterations);
        }

        debug!("[FLOW] Level {} ({}x{}) done", level, lw, lh);
        coarse = Some(flow);
    }

    coarse.ok_or(FlowError::EmptyFrame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(width: u32, height: u32, cx: f32, cy: f32, sigma: f32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let v = 40.0 + 180.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            Luma([v.round() as u8])
        })
    }

    #[test]
    fn test_default_params() {
        let p = FarnebackParams::default();
        assert_eq!(p.pyr_scale, 0.5);
        assert_eq!(p.levels, 3);
        assert_eq!(p.win_size, 15);
        assert_eq!(p.iterations, 3);
        assert_eq!(p.poly_n, 5);
        assert_eq!(p.poly_sigma, 1.2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut p = FarnebackParams::default();
        p.pyr_scale = 1.0;
        assert!(matches!(p.validate(), Err(FlowError::InvalidParams(_))));

        let mut p = FarnebackParams::default();
        p.iterations = 0;
        assert!(p.validate().is_err());

        let mut p = FarnebackParams::default();
        p.poly_sigma = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_pyramid_depth_respects_min_size() {
        let p = FarnebackParams::default();
        assert_eq!(p.pyramid_depth(640, 480), 3);
        assert_eq!(p.pyramid_depth(96, 96), 1);
        assert_eq!(p.pyramid_depth(40, 40), 0);
    }

    #[test]
    fn test_poly_basis_inverse_is_finite() {
        let basis = PolyBasis::new(5, 1.2).expect("basis");
        for v in [basis.ig11, basis.ig03, basis.ig33, basis.ig55] {
            assert!(v.is_finite());
        }
        let sum: f32 = basis.g.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let img = blob(64, 64, 32.0, 32.0, 4.0);
        let flow = farneback(&img, &img, &FarnebackParams::default()).expect("flow");
        assert_eq!(flow.width(), 64);
        assert_eq!(flow.height(), 64);
        assert!(flow.vectors().all(|(dx, dy)| dx == 0.0 && dy == 0.0));
    }

    #[test]
    fn test_blob_shift_right_gives_positive_dx() {
        let prev = blob(96, 96, 46.0, 48.0, 6.0);
        let next = blob(96, 96, 48.0, 48.0, 6.0);
        let flow = farneback(&prev, &next, &FarnebackParams::default()).expect("flow");

        let (dx, dy) = flow.at(47, 48);
        assert!(dx > 0.5, "expected rightward motion, got dx={}", dx);
        assert!(dy.abs() < dx * 0.5, "expected mostly horizontal motion, got dy={}", dy);
    }

    #[test]
    fn test_mismatched_sizes_fail() {
        let a = GrayImage::new(32, 32);
        let b = GrayImage::new(32, 31);
        let err = farneback(&a, &b, &FarnebackParams::default()).unwrap_err();
        assert!(matches!(err, FlowError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_polar_angle_range() {
        let mut flow = FlowField::zeros(2, 1);
        flow.set(0, 0.0, -1.0);
        flow.set(1, -3.0, 4.0);
        let (mag, ang) = flow.to_polar();
        assert!((mag[1] - 5.0).abs() < 1e-6);
        assert!(ang.iter().all(|a| *a >= 0.0 && *a < std::f32::consts::TAU));
        assert!((ang[0] - 1.5 * std::f32::consts::PI).abs() < 1e-5);
    }
}
