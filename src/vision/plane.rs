// SYNOID Float Planes
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use image::GrayImage;

/// Single-channel f32 image used by the flow estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_gray(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            data: img.as_raw().iter().map(|&p| p as f32).collect(),
        }
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Multiply every sample in place.
    pub fn scale(&mut self, factor: f32) {
        for v in self.data.iter_mut() {
            *v *= factor;
        }
    }

    /// Separable Gaussian blur with reflect-101 borders.
    ///
    /// A non-positive `sigma` is derived from the kernel size.
    pub fn gaussian_blur(&self, ksize: usize, sigma: f64) -> Plane {
        let kernel = gaussian_kernel(ksize, sigma);
        let half = (kernel.len() / 2) as isize;

        let mut tmp = Plane::zeros(self.width, self.height);
        for y in 0..self.height {
            let src = self.row(y);
            let dst = &mut tmp.data[y * self.width..(y + 1) * self.width];
            for (x, out) in dst.iter_mut().enumerate() {
                let mut acc = 0.0f64;
                for (i, k) in kernel.iter().enumerate() {
                    let sx = reflect101(x as isize + i as isize - half, self.width);
                    acc += *k * src[sx] as f64;
                }
                *out = acc as f32;
            }
        }

        let mut out = Plane::zeros(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0f64;
                for (i, k) in kernel.iter().enumerate() {
                    let sy = reflect101(y as isize + i as isize - half, self.height);
                    acc += *k * tmp.at(x, sy) as f64;
                }
                out.data[y * self.width + x] = acc as f32;
            }
        }
        out
    }

    /// Bilinear resize using pixel-center alignment and clamped edges.
    pub fn resize(&self, width: usize, height: usize) -> Plane {
        if width == self.width && height == self.height {
            return self.clone();
        }

        let xs = linear_taps(self.width, width);
        let ys = linear_taps(self.height, height);

        let mut out = Plane::zeros(width, height);
        for (dy, &(sy, fy)) in ys.iter().enumerate() {
            let sy1 = (sy + 1).min(self.height - 1);
            let r0 = self.row(sy);
            let r1 = self.row(sy1);
            for (dx, &(sx, fx)) in xs.iter().enumerate() {
                let sx1 = (sx + 1).min(self.width - 1);
                let top = r0[sx] * (1.0 - fx) + r0[sx1] * fx;
                let bottom = r1[sx] * (1.0 - fx) + r1[sx1] * fx;
                out.data[dy * width + dx] = top * (1.0 - fy) + bottom * fy;
            }
        }
        out
    }
}

/// Source index and fractional weight for each destination sample.
fn linear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, f32)> {
    let ratio = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let f = (d as f64 + 0.5) * ratio - 0.5;
            let mut s = f.floor();
            let mut frac = f - s;
            if s < 0.0 {
                s = 0.0;
                frac = 0.0;
            }
            if s as usize >= src_len - 1 {
                s = (src_len - 1) as f64;
                frac = 0.0;
            }
            (s as usize, frac as f32)
        })
        .collect()
}

fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f64> {
    let ksize = ksize.max(1) | 1;
    if sigma <= 0.0 && ksize == 3 {
        return vec![0.25, 0.5, 0.25];
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let center = (ksize / 2) as f64;
    let mut kernel: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Mirror an index into `0..len` without repeating the edge sample.
fn reflect101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect101_borders() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-3, 1), 0);
    }

    #[test]
    fn test_blur_keeps_constant_plane() {
        let plane = Plane {
            width: 7,
            height: 4,
            data: vec![42.0; 28],
        };
        let blurred = plane.gaussian_blur(5, 1.0);
        for v in blurred.data {
            assert!((v - 42.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_small_kernel_table() {
        let k = gaussian_kernel(3, 0.0);
        assert_eq!(k, vec![0.25, 0.5, 0.25]);
        let k = gaussian_kernel(9, 2.0);
        assert!((k.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(k[4] > k[3] && k[3] > k[0]);
    }

    #[test]
    fn test_resize_halves_ramp() {
        let plane = Plane {
            width: 4,
            height: 1,
            data: vec![0.0, 10.0, 20.0, 30.0],
        };
        let half = plane.resize(2, 1);
        assert_eq!(half.data, vec![5.0, 25.0]);
    }

    #[test]
    fn test_resize_upscale_clamps_edges() {
        let plane = Plane {
            width: 2,
            height: 1,
            data: vec![0.0, 8.0],
        };
        let up = plane.resize(4, 1);
        assert_eq!(up.data, vec![0.0, 2.0, 6.0, 8.0]);
    }
}
