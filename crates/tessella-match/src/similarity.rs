//! Edge similarity filter.
//!
//! Two tiles are "similar" when their Canny edge maps, compared pixel
//! by pixel at the query's resolution, differ by less than a fixed
//! summed amount. The candidate is resized to the query; the query is
//! never resized.
//!
//! Raster scratch space (two grayscale images and two edge maps) is
//! borrowed from a [`ScratchPool`] through a [`Scratch`] guard. The
//! guard hands its buffers back when dropped, so every comparison
//! releases exactly once whether it succeeds, fails closed, or unwinds.

use crate::edge::{canny_into, gaussian_blur};
use crate::grayscale::grayscale_into;
use crate::resize::resize_to;
use crate::types::{Dimensions, MatchConfig, ProcessingError, RgbaImage};

/// Raster buffers for one pairwise comparison.
#[derive(Debug, Default)]
struct Buffers {
    query_gray: Vec<u8>,
    candidate_gray: Vec<u8>,
    query_edges: Vec<u8>,
    candidate_edges: Vec<u8>,
}

/// Recycles edge-detection scratch buffers across comparisons and
/// counts acquisitions and releases.
#[derive(Debug, Default)]
pub struct ScratchPool {
    free: Option<Buffers>,
    acquired: usize,
    released: usize,
}

impl ScratchPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of guards handed out so far.
    #[must_use]
    pub const fn acquired(&self) -> usize {
        self.acquired
    }

    /// Number of guards that have returned their buffers.
    #[must_use]
    pub const fn released(&self) -> usize {
        self.released
    }

    /// Take a scratch guard, reusing previously released buffers.
    pub fn acquire(&mut self) -> Scratch<'_> {
        self.acquired += 1;
        let buffers = self.free.take().unwrap_or_default();
        Scratch {
            pool: self,
            buffers,
        }
    }
}

/// Scoped ownership of one set of scratch buffers.
///
/// Dropping the guard returns the buffers to their pool.
#[derive(Debug)]
pub struct Scratch<'p> {
    pool: &'p mut ScratchPool,
    buffers: Buffers,
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.pool.free = Some(std::mem::take(&mut self.buffers));
        self.pool.released += 1;
    }
}

/// Summed absolute difference between the edge maps of `query` and
/// `candidate`, computed at the query's dimensions.
///
/// # Errors
///
/// Returns [`ProcessingError::EmptyImage`] if either bitmap has no
/// pixels, and [`ProcessingError::ResizeFailed`] if the candidate could
/// not be brought to the query's size.
pub fn edge_difference(
    query: &RgbaImage,
    candidate: &RgbaImage,
    config: &MatchConfig,
    pool: &mut ScratchPool,
) -> Result<u64, ProcessingError> {
    let mut scratch = pool.acquire();

    let target = Dimensions::of(query);
    if target.is_empty() {
        return Err(ProcessingError::EmptyImage(target));
    }
    let candidate_dims = Dimensions::of(candidate);
    if candidate_dims.is_empty() {
        return Err(ProcessingError::EmptyImage(candidate_dims));
    }

    let resized = resize_to(candidate, target, config.resize_filter);
    let resized_dims = Dimensions::of(resized.as_ref());
    if resized_dims != target {
        return Err(ProcessingError::ResizeFailed {
            expected: target,
            actual: resized_dims,
        });
    }

    let buffers = &mut scratch.buffers;
    let query_edges = detect_edges(
        query,
        config,
        std::mem::take(&mut buffers.query_gray),
        std::mem::take(&mut buffers.query_edges),
        &mut buffers.query_gray,
    );
    let candidate_edges = detect_edges(
        resized.as_ref(),
        config,
        std::mem::take(&mut buffers.candidate_gray),
        std::mem::take(&mut buffers.candidate_edges),
        &mut buffers.candidate_gray,
    );

    let sum = query_edges
        .iter()
        .zip(candidate_edges.iter())
        .map(|(&a, &b)| u64::from(a.abs_diff(b)))
        .sum();

    buffers.query_edges = query_edges.into_raw();
    buffers.candidate_edges = candidate_edges.into_raw();
    Ok(sum)
}

/// Grayscale, optionally blur, and run Canny, recycling `gray_buffer`
/// and `edge_buffer`. The grayscale allocation is parked back in
/// `gray_slot` once the edge map exists.
fn detect_edges(
    image: &RgbaImage,
    config: &MatchConfig,
    gray_buffer: Vec<u8>,
    edge_buffer: Vec<u8>,
    gray_slot: &mut Vec<u8>,
) -> image::GrayImage {
    let gray = gaussian_blur(grayscale_into(image, gray_buffer), config.blur_sigma);
    let edges = canny_into(
        &gray,
        config.canny_low,
        config.canny_high,
        config.gradient_norm,
        edge_buffer,
    );
    *gray_slot = gray.into_raw();
    edges
}

/// Decide whether two tiles look alike beyond raw color.
///
/// Fails closed: if the comparison cannot run, the failure is logged
/// and the pair is reported as not similar.
#[must_use]
pub fn is_similar(query: &RgbaImage, candidate: &RgbaImage, config: &MatchConfig) -> bool {
    is_similar_with(query, candidate, config, &mut ScratchPool::new())
}

/// [`is_similar`] drawing scratch buffers from `pool`.
#[must_use]
pub fn is_similar_with(
    query: &RgbaImage,
    candidate: &RgbaImage,
    config: &MatchConfig,
    pool: &mut ScratchPool,
) -> bool {
    match edge_difference(query, candidate, config, pool) {
        Ok(sum) => sum < config.edge_difference_threshold,
        Err(e) => {
            tracing::warn!(error = %e, "edge comparison failed, treating pair as not similar");
            false
        }
    }
}
