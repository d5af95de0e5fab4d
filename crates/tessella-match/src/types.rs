//! Shared types for the tessella matching pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::edge::GradientNorm;
use crate::resize::ResizeFilter;

/// Re-export `RgbaImage` so downstream crates can hand decoded bitmaps
/// to the pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// Re-export `GrayImage` for callers inspecting edge maps.
pub use image::GrayImage;

/// A representative color: one 8-bit value per RGB channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Pure black, returned for images without any pixels.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Create a new color sample.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance in RGB space.
    ///
    /// Exact integer arithmetic; use this when only the ordering matters.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> u32 {
        let dr = i32::from(self.r) - i32::from(other.r);
        let dg = i32::from(self.g) - i32::from(other.g);
        let db = i32::from(self.b) - i32::from(other.b);
        dr.unsigned_abs().pow(2) + dg.unsigned_abs().pow(2) + db.unsigned_abs().pow(2)
    }

    /// Euclidean distance in RGB space, in `[0, 441.67]`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        f64::from(self.distance_squared(other)).sqrt()
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(color: Rgb) -> Self {
        [color.r, color.g, color.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A reference tile: display name plus decoded bitmap.
///
/// Immutable once constructed. The [`Gallery`] owns every entry; the
/// rest of the pipeline only borrows them.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    name: String,
    image: RgbaImage,
}

impl GalleryEntry {
    /// Create a gallery entry.
    #[must_use]
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Display name of the tile.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded reference bitmap.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Bitmap dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }
}

/// The fixed set of reference tiles, in insertion order.
///
/// Populated once and read-only afterwards, so it can be shared by
/// reference between any number of comparisons.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Create a gallery from entries; their order becomes the tie-break
    /// order for ranking.
    #[must_use]
    pub const fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the gallery has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, GalleryEntry> {
        self.entries.iter()
    }
}

impl FromIterator<GalleryEntry> for Gallery {
    fn from_iter<I: IntoIterator<Item = GalleryEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a GalleryEntry;
    type IntoIter = std::slice::Iter<'a, GalleryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A gallery entry scored against one query color.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'g> {
    /// The scored entry.
    pub entry: &'g GalleryEntry,
    /// Position of the entry in the gallery.
    pub index: usize,
    /// Euclidean RGB distance between the query color and the entry color.
    pub color_distance: f64,
}

impl ScoredCandidate<'_> {
    /// Whether this candidate's color is close enough to count as an
    /// exact match. The comparison is strict.
    #[must_use]
    pub fn is_exact(&self, threshold: f64) -> bool {
        self.color_distance < threshold
    }
}

/// Output of one comparison.
///
/// Both lists are ordered by ascending color distance. The same entry
/// may appear in both.
#[derive(Debug, Clone, Default)]
pub struct MatchResult<'g> {
    /// Entries whose color distance is below the exact-match threshold.
    pub exact_matches: Vec<ScoredCandidate<'g>>,
    /// Closest entries that also passed the edge similarity test.
    pub similar_matches: Vec<ScoredCandidate<'g>>,
}

impl MatchResult<'_> {
    /// Returns `true` when neither list has an entry ("no tile found").
    ///
    /// This is a normal outcome, distinct from any pipeline error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact_matches.is_empty() && self.similar_matches.is_empty()
    }
}

/// Configuration for the matching pipeline.
///
/// The two acceptance thresholds are empirical constants with no
/// normalization for image size; changing the working resolution of the
/// inputs changes what `edge_difference_threshold` means.
///
/// # Canny threshold invariants
///
/// Both `canny_low` and `canny_high` must be at least
/// [`edge::MIN_THRESHOLD`](crate::edge::MIN_THRESHOLD), and `canny_low`
/// must not exceed `canny_high`. [`validate`](Self::validate) reports
/// violations; [`edge::canny`](crate::edge::canny) clamps regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Color distance strictly below which an entry is an exact match.
    pub exact_match_threshold: f64,

    /// Summed edge-map difference strictly below which two tiles are
    /// considered visually similar.
    pub edge_difference_threshold: u64,

    /// Maximum number of entries in the similar list.
    pub max_similar: usize,

    /// Canny low (linking) threshold on gradient magnitude.
    pub canny_low: f32,

    /// Canny high (seed) threshold on gradient magnitude.
    pub canny_high: f32,

    /// How Sobel gradients are combined into a magnitude.
    pub gradient_norm: GradientNorm,

    /// Gaussian sigma applied before edge detection. Zero disables it.
    pub blur_sigma: f32,

    /// Resampling filter used to bring a candidate to the query's size.
    pub resize_filter: ResizeFilter,

    /// Color extraction samples every n-th pixel.
    pub color_sample_stride: usize,

    /// Bits kept per channel when bucketing colors (1..=8).
    pub color_quantization_bits: u8,
}

impl MatchConfig {
    /// Default exact-match color distance threshold.
    pub const DEFAULT_EXACT_MATCH_THRESHOLD: f64 = 2.5;
    /// Default edge-difference threshold.
    pub const DEFAULT_EDGE_DIFFERENCE_THRESHOLD: u64 = 100_000;
    /// Default similar-list length.
    pub const DEFAULT_MAX_SIMILAR: usize = 5;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 100.0;
    /// Default gradient norm.
    pub const DEFAULT_GRADIENT_NORM: GradientNorm = GradientNorm::L1;
    /// Default pre-blur sigma (disabled).
    pub const DEFAULT_BLUR_SIGMA: f32 = 0.0;
    /// Default resampling filter.
    pub const DEFAULT_RESIZE_FILTER: ResizeFilter = ResizeFilter::Triangle;
    /// Default color sampling stride.
    pub const DEFAULT_COLOR_SAMPLE_STRIDE: usize = 10;
    /// Default bits per channel for color bucketing.
    pub const DEFAULT_COLOR_QUANTIZATION_BITS: u8 = 5;

    /// Check the configuration for values the pipeline cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.exact_match_threshold.is_finite() || self.exact_match_threshold < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "exact_match_threshold must be finite and non-negative, got {}",
                self.exact_match_threshold,
            )));
        }
        let min = crate::edge::MIN_THRESHOLD;
        if self.canny_low.is_nan()
            || self.canny_high.is_nan()
            || self.canny_low < min
            || self.canny_high < min
        {
            return Err(MatchError::InvalidConfig(format!(
                "canny thresholds must be at least {}, got low={} high={}",
                crate::edge::MIN_THRESHOLD,
                self.canny_low,
                self.canny_high,
            )));
        }
        if self.canny_low > self.canny_high {
            return Err(MatchError::InvalidConfig(format!(
                "canny_low ({}) exceeds canny_high ({})",
                self.canny_low, self.canny_high,
            )));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "blur_sigma must be finite and non-negative, got {}",
                self.blur_sigma,
            )));
        }
        if self.color_sample_stride == 0 {
            return Err(MatchError::InvalidConfig(
                "color_sample_stride must be at least 1".to_string(),
            ));
        }
        if !(1..=8).contains(&self.color_quantization_bits) {
            return Err(MatchError::InvalidConfig(format!(
                "color_quantization_bits must be in 1..=8, got {}",
                self.color_quantization_bits,
            )));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            exact_match_threshold: Self::DEFAULT_EXACT_MATCH_THRESHOLD,
            edge_difference_threshold: Self::DEFAULT_EDGE_DIFFERENCE_THRESHOLD,
            max_similar: Self::DEFAULT_MAX_SIMILAR,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            gradient_norm: Self::DEFAULT_GRADIENT_NORM,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            resize_filter: Self::DEFAULT_RESIZE_FILTER,
            color_sample_stride: Self::DEFAULT_COLOR_SAMPLE_STRIDE,
            color_quantization_bits: Self::DEFAULT_COLOR_QUANTIZATION_BITS,
        }
    }
}

/// Errors surfaced by the pipeline's public entry points.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Failed to decode an image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The configuration is invalid.
    #[error("invalid match configuration: {0}")]
    InvalidConfig(String),
}

/// Reasons the edge comparison of a single pair could not run.
///
/// Never escapes [`crate::similarity::is_similar`]: the pair is treated
/// as not similar and the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    /// One of the two bitmaps has no pixels.
    #[error("cannot detect edges on an empty {0} image")]
    EmptyImage(Dimensions),

    /// Resampling did not produce the query's dimensions.
    #[error("resize produced {actual}, expected {expected}")]
    ResizeFailed {
        /// The query dimensions.
        expected: Dimensions,
        /// What the resize produced.
        actual: Dimensions,
    },
}
