//! tessella-match: Pure tile matching pipeline (sans-IO).
//!
//! Finds a photographed tile in a gallery of reference tiles through:
//! dominant color extraction -> color distance ranking ->
//! edge similarity filtering -> result assembly.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! in-memory bitmaps and returns structured data. Manifest loading,
//! capture sources, and rendering live in `tessella-io`.

pub mod color;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod rank;
pub mod resize;
pub mod similarity;
pub mod types;

pub use color::extract_color;
pub use edge::GradientNorm;
pub use grayscale::decode;
pub use rank::rank;
pub use resize::ResizeFilter;
pub use similarity::{ScratchPool, is_similar};
pub use types::{
    Dimensions, Gallery, GalleryEntry, GrayImage, MatchConfig, MatchError, MatchResult,
    ProcessingError, Rgb, RgbaImage, ScoredCandidate,
};

/// Outcome counts from one pass of the edge filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EdgeFilterStats {
    /// Pairs whose edge difference was computed or attempted.
    pub evaluated: usize,
    /// Pairs that could not be compared and failed closed.
    pub failed: usize,
    /// Pairs accepted as similar.
    pub passed: usize,
}

/// Walk `ranked` in order and keep the first `config.max_similar`
/// candidates whose edge maps are close to the query's.
///
/// Stops comparing once the list is full; later candidates could not
/// make it into the result anyway.
pub(crate) fn similar_matches<'g>(
    query: &RgbaImage,
    ranked: &[ScoredCandidate<'g>],
    config: &MatchConfig,
    stats: &mut EdgeFilterStats,
) -> Vec<ScoredCandidate<'g>> {
    let mut pool = ScratchPool::new();
    let mut similar = Vec::with_capacity(config.max_similar.min(ranked.len()));

    for candidate in ranked {
        if similar.len() >= config.max_similar {
            break;
        }
        stats.evaluated += 1;
        match similarity::edge_difference(query, candidate.entry.image(), config, &mut pool) {
            Ok(sum) if sum < config.edge_difference_threshold => {
                tracing::debug!(name = candidate.entry.name(), sum, "edge filter: similar");
                stats.passed += 1;
                similar.push(*candidate);
            }
            Ok(sum) => {
                tracing::debug!(name = candidate.entry.name(), sum, "edge filter: rejected");
            }
            Err(e) => {
                tracing::warn!(
                    name = candidate.entry.name(),
                    error = %e,
                    "edge comparison failed, treating pair as not similar",
                );
                stats.failed += 1;
            }
        }
    }

    tracing::debug!(
        scratch_acquired = pool.acquired(),
        scratch_released = pool.released(),
        passed = similar.len(),
        "edge filter done"
    );
    similar
}

/// Assemble the match result for one query.
///
/// Ranks the whole gallery by color distance to `query_color`, collects
/// every entry under the exact-match threshold, and independently runs
/// the ranked list through the edge filter against `query`, keeping the
/// first `config.max_similar` that pass. An entry may appear in both
/// lists. Two empty lists mean "no tile found", which is not an error.
#[must_use]
pub fn build<'g>(
    query_color: Rgb,
    query: &RgbaImage,
    gallery: &'g Gallery,
    config: &MatchConfig,
) -> MatchResult<'g> {
    let ranked = rank::rank(query_color, gallery, config);
    let exact_matches = rank::exact_matches(&ranked, config.exact_match_threshold);
    let similar_matches = similar_matches(query, &ranked, config, &mut EdgeFilterStats::default());
    MatchResult {
        exact_matches,
        similar_matches,
    }
}

/// Run the full matching pipeline on a decoded query bitmap.
///
/// # Pipeline steps
///
/// 1. Extract the query's dominant color
/// 2. Rank every gallery entry by color distance
/// 3. Collect exact matches
/// 4. Filter the ranked list by edge similarity
///
/// # Errors
///
/// Returns [`MatchError::InvalidConfig`] if `config` fails
/// [`MatchConfig::validate`].
pub fn match_tile<'g>(
    query: &RgbaImage,
    gallery: &'g Gallery,
    config: &MatchConfig,
) -> Result<MatchResult<'g>, MatchError> {
    config.validate()?;
    let query_color = extract_color(query, config);
    Ok(build(query_color, query, gallery, config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn solid(value: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(32, 32, image::Rgba([value[0], value[1], value[2], 255]))
    }

    /// Gray tile crossed by a dark vertical vein every 8 pixels.
    fn veined(offset: u32) -> RgbaImage {
        RgbaImage::from_fn(32, 32, |x, _| {
            if (x + offset) % 8 == 0 {
                image::Rgba([20, 20, 20, 255])
            } else {
                image::Rgba([150, 150, 150, 255])
            }
        })
    }

    fn names(list: &[ScoredCandidate<'_>]) -> Vec<String> {
        list.iter().map(|c| c.entry.name().to_string()).collect()
    }

    #[test]
    fn empty_gallery_gives_empty_result() {
        let gallery = Gallery::default();
        let result = match_tile(&solid([1, 2, 3]), &gallery, &MatchConfig::default()).unwrap();
        assert!(result.exact_matches.is_empty());
        assert!(result.similar_matches.is_empty());
        assert!(result.is_empty());
    }

    #[test]
    fn identical_query_appears_in_both_lists() {
        let gallery = Gallery::new(vec![
            GalleryEntry::new("other", solid([200, 10, 10])),
            GalleryEntry::new("twin", veined(0)),
        ]);
        let result = match_tile(&veined(0), &gallery, &MatchConfig::default()).unwrap();
        assert_eq!(names(&result.exact_matches), ["twin"]);
        assert_eq!(names(&result.similar_matches)[0], "twin");
        assert!(result.exact_matches[0].color_distance.abs() < f64::EPSILON);
    }

    #[test]
    fn similar_list_is_capped() {
        let gallery: Gallery = (0u8..12)
            .map(|i| GalleryEntry::new(format!("plain-{i}"), solid([i * 20, 40, 40])))
            .collect();
        let result = match_tile(&solid([0, 40, 40]), &gallery, &MatchConfig::default()).unwrap();
        assert_eq!(result.similar_matches.len(), 5);
        let distances: Vec<f64> = result.similar_matches.iter().map(|c| c.color_distance).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(names(&result.similar_matches)[0], "plain-0");
    }

    #[test]
    fn custom_similar_cap_is_respected() {
        let gallery: Gallery = (0u8..4)
            .map(|i| GalleryEntry::new(format!("p{i}"), solid([i, i, i])))
            .collect();
        let config = MatchConfig {
            max_similar: 2,
            ..MatchConfig::default()
        };
        let result = match_tile(&solid([0, 0, 0]), &gallery, &config).unwrap();
        assert_eq!(result.similar_matches.len(), 2);
    }

    #[test]
    fn high_edge_difference_excludes_closest_color() {
        // "plain" has the exact query color but none of its veins.
        let query = RgbaImage::from_fn(64, 64, |x, _| {
            if (x / 4) % 2 == 0 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let gallery = Gallery::new(vec![
            GalleryEntry::new("plain", RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 0, 255]))),
            GalleryEntry::new("striped", query.clone()),
        ]);
        let result = match_tile(&query, &gallery, &MatchConfig::default()).unwrap();
        assert_eq!(names(&result.exact_matches), ["plain", "striped"]);
        assert_eq!(names(&result.similar_matches), ["striped"]);
    }

    #[test]
    fn no_exact_match_when_colors_differ() {
        let gallery = Gallery::new(vec![GalleryEntry::new("far", solid([100, 100, 100]))]);
        let result = match_tile(&solid([10, 10, 10]), &gallery, &MatchConfig::default()).unwrap();
        assert!(result.exact_matches.is_empty());
        // Plain tiles share an empty edge map, so color alone does not
        // keep it out of the similar list.
        assert_eq!(names(&result.similar_matches), ["far"]);
    }

    #[test]
    fn two_tile_scenario_builds_exact_match() {
        let gallery = Gallery::new(vec![
            GalleryEntry::new("A", solid([10, 10, 10])),
            GalleryEntry::new("B", solid([200, 200, 200])),
        ]);
        let result = build(
            Rgb::new(10, 10, 11),
            &solid([10, 10, 11]),
            &gallery,
            &MatchConfig::default(),
        );
        assert_eq!(names(&result.exact_matches), ["A"]);
        assert!((result.exact_matches[0].color_distance - 1.0).abs() < 1e-9);
        assert_eq!(names(&result.similar_matches), ["A", "B"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MatchConfig {
            color_sample_stride: 0,
            ..MatchConfig::default()
        };
        let gallery = Gallery::default();
        let result = match_tile(&solid([0, 0, 0]), &gallery, &config);
        assert!(matches!(result, Err(MatchError::InvalidConfig(_))));
    }

    #[test]
    fn failing_pair_does_not_abort_batch() {
        let gallery = Gallery::new(vec![
            GalleryEntry::new("broken", RgbaImage::new(0, 0)),
            GalleryEntry::new("good", solid([5, 5, 5])),
        ]);
        let ranked = rank::rank(Rgb::new(5, 5, 5), &gallery, &MatchConfig::default());
        let mut stats = EdgeFilterStats::default();
        let similar = similar_matches(&solid([5, 5, 5]), &ranked, &MatchConfig::default(), &mut stats);
        assert_eq!(names(&similar), ["good"]);
        assert_eq!(
            stats,
            EdgeFilterStats {
                evaluated: 2,
                failed: 1,
                passed: 1,
            }
        );
    }

    #[test]
    fn shifted_veins_are_not_similar_at_tight_threshold() {
        let config = MatchConfig {
            edge_difference_threshold: 1,
            ..MatchConfig::default()
        };
        let gallery = Gallery::new(vec![GalleryEntry::new("shifted", veined(3))]);
        let result = match_tile(&veined(0), &gallery, &config).unwrap();
        assert_eq!(names(&result.exact_matches), ["shifted"]);
        assert!(result.similar_matches.is_empty());
    }
}
