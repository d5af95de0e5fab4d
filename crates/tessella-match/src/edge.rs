//! Canny edge detection.
//!
//! Produces a binary edge map (255 = edge, 0 = background) from a
//! grayscale raster:
//!
//! 1. optional Gaussian pre-blur,
//! 2. 3x3 Sobel gradients with replicated borders,
//! 3. gradient magnitude ([`GradientNorm`]),
//! 4. non-maximum suppression along the quantized gradient direction,
//! 5. hysteresis: pixels above the high threshold seed edges, pixels
//!    above the low threshold join an edge when 8-connected to one.
//!
//! No smoothing is applied by default, so the thresholds act directly on
//! raw Sobel responses. The border ring is never marked as an edge.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel;
use serde::{Deserialize, Serialize};

/// Minimum allowed Canny threshold.
///
/// A zero low threshold lets every pixel with any gradient join an edge,
/// which turns tile texture noise into a dense edge map.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// tan(22.5°): boundary between horizontal, diagonal and vertical
/// gradient directions.
const TAN_22_5: f32 = 0.414_213_56;

/// tan(67.5°).
const TAN_67_5: f32 = 2.414_213_6;

/// How the horizontal and vertical gradients combine into a magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientNorm {
    /// `|gx| + |gy|`.
    #[default]
    L1,
    /// `sqrt(gx² + gy²)`.
    L2,
}

impl GradientNorm {
    fn magnitude(self, gx: i16, gy: i16) -> f32 {
        let (gx, gy) = (f32::from(gx), f32::from(gy));
        match self {
            Self::L1 => gx.abs() + gy.abs(),
            Self::L2 => gx.hypot(gy),
        }
    }
}

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image;
    }

    imageproc::filter::gaussian_blur_f32(&image, sigma)
}

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Both thresholds are clamped to a minimum of [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to be at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(
    image: &GrayImage,
    low_threshold: f32,
    high_threshold: f32,
    norm: GradientNorm,
) -> GrayImage {
    canny_into(image, low_threshold, high_threshold, norm, Vec::new())
}

/// [`canny`], writing the edge map into a recycled buffer.
#[must_use = "returns the binary edge map built in the recycled buffer"]
pub fn canny_into(
    image: &GrayImage,
    low_threshold: f32,
    high_threshold: f32,
    norm: GradientNorm,
    mut buffer: Vec<u8>,
) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let (width, height) = image.dimensions();
    buffer.clear();
    buffer.resize(width as usize * height as usize, 0);

    // Non-maximum suppression needs a full 3x3 neighborhood.
    if width >= 3 && height >= 3 {
        let gx: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_HORIZONTAL_3X3);
        let gy: Image<Luma<i16>> = filter_clamped(image, kernel::SOBEL_VERTICAL_3X3);
        let gradients = Gradients {
            gx: gx.as_raw(),
            gy: gy.as_raw(),
            magnitude: gx
                .as_raw()
                .iter()
                .zip(gy.as_raw())
                .map(|(&h, &v)| norm.magnitude(h, v))
                .collect(),
            width: width as usize,
            height: height as usize,
        };
        let thinned = gradients.suppress_non_maxima(low);
        hysteresis(&thinned, low, high, width as usize, height as usize, &mut buffer);
    }

    GrayImage::from_raw(width, height, buffer).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Per-pixel Sobel responses and their magnitude, row-major.
struct Gradients<'a> {
    gx: &'a [i16],
    gy: &'a [i16],
    magnitude: Vec<f32>,
    width: usize,
    height: usize,
}

impl Gradients<'_> {
    /// Keep only pixels that are local maxima across the edge and above
    /// `low`; everything else (including the border ring) becomes 0.
    ///
    /// Ties along the horizontal and vertical directions are broken
    /// toward the lower coordinate so a plateau thins to one pixel.
    fn suppress_non_maxima(&self, low: f32) -> Vec<f32> {
        let w = self.width;
        let mag = &self.magnitude;
        let mut out = vec![0.0; mag.len()];

        for y in 1..self.height - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let m = mag[i];
                if m <= low {
                    continue;
                }

                let gx = f32::from(self.gx[i]);
                let gy = f32::from(self.gy[i]);
                let (ax, ay) = (gx.abs(), gy.abs());

                let is_max = if ay < ax * TAN_22_5 {
                    m > mag[i - 1] && m >= mag[i + 1]
                } else if ay > ax * TAN_67_5 {
                    m > mag[i - w] && m >= mag[i + w]
                } else if (gx < 0.0) == (gy < 0.0) {
                    // Gradient points along the main diagonal.
                    m > mag[i - w - 1] && m > mag[i + w + 1]
                } else {
                    m > mag[i - w + 1] && m > mag[i + w - 1]
                };

                if is_max {
                    out[i] = m;
                }
            }
        }
        out
    }
}

/// Mark edges: pixels above `high` seed a depth-first flood that claims
/// 8-connected pixels above `low`.
fn hysteresis(thinned: &[f32], low: f32, high: f32, width: usize, height: usize, out: &mut [u8]) {
    let mut stack = Vec::new();

    for seed in 0..thinned.len() {
        if thinned[seed] <= high || out[seed] != 0 {
            continue;
        }
        out[seed] = 255;
        stack.push(seed);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % width, i / width);
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if out[n] == 0 && thinned[n] > low {
                        out[n] = 255;
                        stack.push(n);
                    }
                }
            }
        }
    }
}
