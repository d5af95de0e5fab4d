//! Dominant color extraction.
//!
//! Every `stride`-th pixel is sampled, translucent and near-white
//! pixels are dropped, and the survivors are bucketed into a 3-D
//! histogram with `bits` bits per channel. The most populous bucket
//! wins and its members' mean is returned, so a single-color tile maps
//! back to exactly its own color.
//!
//! When nothing survives the filters (a fully transparent or all-white
//! tile) the plain average of every pixel is returned instead.

use std::collections::BTreeMap;

use crate::types::{MatchConfig, Rgb, RgbaImage};

/// Pixels with alpha below this are ignored.
const MIN_ALPHA: u8 = 125;

/// Pixels with every channel above this are treated as background.
const WHITE_CUTOFF: u8 = 250;

/// Running channel sums for a set of pixels.
#[derive(Debug, Clone, Copy, Default)]
struct ColorSum {
    count: u64,
    r: u64,
    g: u64,
    b: u64,
}

impl ColorSum {
    fn add(&mut self, [r, g, b]: [u8; 3]) {
        self.count += 1;
        self.r += u64::from(r);
        self.g += u64::from(g);
        self.b += u64::from(b);
    }

    /// Rounded per-channel mean, or `None` for an empty set.
    fn mean(self) -> Option<Rgb> {
        if self.count == 0 {
            return None;
        }
        let channel = |sum: u64| {
            let rounded = (sum + self.count / 2) / self.count;
            u8::try_from(rounded).unwrap_or(u8::MAX)
        };
        Some(Rgb::new(channel(self.r), channel(self.g), channel(self.b)))
    }
}

/// Compute the representative color of a bitmap.
///
/// Deterministic for a given bitmap and config: bucket ties resolve to
/// the lowest bucket index. An image with no pixels yields
/// [`Rgb::BLACK`].
#[must_use]
pub fn extract_color(image: &RgbaImage, config: &MatchConfig) -> Rgb {
    dominant_color(
        image,
        config.color_sample_stride,
        config.color_quantization_bits,
    )
    .unwrap_or_else(|| average_color(image))
}

/// Histogram-mode color over sampled pixels, or `None` when no sampled
/// pixel passes the alpha and white filters.
fn dominant_color(image: &RgbaImage, stride: usize, bits: u8) -> Option<Rgb> {
    let bits = bits.clamp(1, 8);
    let shift = 8 - bits;
    let levels = 1usize << bits;
    // Sparse: at 8 bits a dense table would hold 2^24 buckets.
    let mut buckets: BTreeMap<usize, ColorSum> = BTreeMap::new();

    for p in image.pixels().step_by(stride.max(1)) {
        let [r, g, b, a] = p.0;
        if a < MIN_ALPHA || (r > WHITE_CUTOFF && g > WHITE_CUTOFF && b > WHITE_CUTOFF) {
            continue;
        }
        let index = ((usize::from(r >> shift) * levels) + usize::from(g >> shift)) * levels
            + usize::from(b >> shift);
        buckets.entry(index).or_default().add([r, g, b]);
    }

    // `max_by_key` keeps the last maximum; reversing keeps the first.
    buckets
        .values()
        .rev()
        .max_by_key(|bucket| bucket.count)
        .and_then(|bucket| bucket.mean())
}

/// Mean color over every pixel, ignoring alpha.
fn average_color(image: &RgbaImage) -> Rgb {
    let mut sum = ColorSum::default();
    for p in image.pixels() {
        let [r, g, b, _] = p.0;
        sum.add([r, g, b]);
    }
    sum.mean().unwrap_or(Rgb::BLACK)
}
