//! Color distance ranking.

use crate::color::extract_color;
use crate::types::{Gallery, MatchConfig, Rgb, ScoredCandidate};

/// Score every gallery entry against `query` and sort by ascending
/// Euclidean RGB distance.
///
/// Entry colors are extracted afresh on every call. The sort is stable,
/// so equal distances keep gallery insertion order and repeated calls
/// return identical sequences.
#[must_use]
pub fn rank<'g>(query: Rgb, gallery: &'g Gallery, config: &MatchConfig) -> Vec<ScoredCandidate<'g>> {
    let mut ranked: Vec<ScoredCandidate<'g>> = gallery
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let color = extract_color(entry.image(), config);
            let color_distance = query.distance(color);
            tracing::debug!(name = entry.name(), %color, color_distance, "scored gallery entry");
            ScoredCandidate {
                entry,
                index,
                color_distance,
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.color_distance.total_cmp(&b.color_distance));
    ranked
}

/// Entries of a ranked list whose distance is below the exact-match
/// threshold, in ranked order.
#[must_use]
pub fn exact_matches<'g>(ranked: &[ScoredCandidate<'g>], threshold: f64) -> Vec<ScoredCandidate<'g>> {
    // Ranked ascending, so the exact matches form a prefix.
    ranked
        .iter()
        .take_while(|candidate| candidate.is_exact(threshold))
        .copied()
        .collect()
}
