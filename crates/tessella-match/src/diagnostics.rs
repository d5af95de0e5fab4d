//! Match diagnostics: timing and counts for each pipeline stage.
//!
//! These diagnostics are permanent instrumentation for threshold tuning.
//! [`match_tile_with_diagnostics`] runs the same pipeline as
//! [`match_tile`](crate::match_tile) and records what each stage did.
//!
//! Time is read through the [`Clock`] trait so callers pick the time
//! source; [`SystemClock`] wraps [`std::time::Instant`].
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Gallery, MatchConfig, MatchError, MatchResult, RgbaImage};
use crate::{EdgeFilterStats, color, rank};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant: Copy;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `start`.
    fn elapsed(&self, start: Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn elapsed(&self, start: Self::Instant) -> Duration {
        start.elapsed()
    }
}

/// Diagnostics collected from a single match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDiagnostics {
    /// Stage 1: query color extraction.
    pub extract: StageDiagnostics,
    /// Stage 2: color distance ranking.
    pub rank: StageDiagnostics,
    /// Stage 3: edge similarity filtering.
    pub edge_filter: StageDiagnostics,
    /// Total wall-clock duration of the match (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: MatchSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Query color extraction metrics.
    Extract {
        /// Query width in pixels.
        width: u32,
        /// Query height in pixels.
        height: u32,
        /// Extracted color as `#rrggbb`.
        color: String,
    },
    /// Ranking metrics.
    Rank {
        /// Number of gallery entries scored.
        candidate_count: usize,
        /// Smallest color distance, if any entry was scored.
        min_distance: Option<f64>,
        /// Entries under the exact-match threshold.
        exact_count: usize,
    },
    /// Edge filter metrics.
    EdgeFilter {
        /// Pairs compared (the walk stops once the list is full).
        pairs_evaluated: usize,
        /// Pairs that could not be compared and failed closed.
        pairs_failed: usize,
        /// Pairs accepted as similar.
        pairs_passed: usize,
    },
}

/// High-level summary counts for a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Query width in pixels.
    pub query_width: u32,
    /// Query height in pixels.
    pub query_height: u32,
    /// Gallery size.
    pub gallery_size: usize,
    /// Exact matches returned.
    pub exact_count: usize,
    /// Similar matches returned.
    pub similar_count: usize,
}

impl MatchDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Match Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Query: {}x{}  |  Gallery: {} entries",
            self.summary.query_width, self.summary.query_height, self.summary.gallery_size,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Extract", &self.extract),
            ("Rank", &self.rank),
            ("Edge Filter", &self.edge_filter),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Exact: {}  |  Similar: {}",
            self.summary.exact_count, self.summary.similar_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Extract {
            width,
            height,
            color,
        } => format!("{width}x{height} -> {color}"),
        StageMetrics::Rank {
            candidate_count,
            min_distance,
            exact_count,
        } => {
            let min = min_distance.map_or_else(|| "n/a".to_string(), |d| format!("{d:.2}"));
            format!("{candidate_count} candidates, min={min}, exact={exact_count}")
        }
        StageMetrics::EdgeFilter {
            pairs_evaluated,
            pairs_failed,
            pairs_passed,
        } => format!("{pairs_evaluated} pairs, {pairs_passed} passed, {pairs_failed} failed"),
    }
}

/// Run [`match_tile`](crate::match_tile) and record per-stage
/// diagnostics, reading time from `clock`.
///
/// # Errors
///
/// Returns [`MatchError::InvalidConfig`] if `config` fails
/// [`MatchConfig::validate`].
pub fn match_tile_with_diagnostics<'g, C: Clock>(
    query: &RgbaImage,
    gallery: &'g Gallery,
    config: &MatchConfig,
    clock: &C,
) -> Result<(MatchResult<'g>, MatchDiagnostics), MatchError> {
    config.validate()?;
    let dims = Dimensions::of(query);
    let total_start = clock.now();

    let start = clock.now();
    let query_color = color::extract_color(query, config);
    let extract = StageDiagnostics {
        duration: clock.elapsed(start),
        metrics: StageMetrics::Extract {
            width: dims.width,
            height: dims.height,
            color: query_color.to_string(),
        },
    };

    let start = clock.now();
    let ranked = rank::rank(query_color, gallery, config);
    let exact_matches = rank::exact_matches(&ranked, config.exact_match_threshold);
    let rank_stage = StageDiagnostics {
        duration: clock.elapsed(start),
        metrics: StageMetrics::Rank {
            candidate_count: ranked.len(),
            min_distance: ranked.first().map(|c| c.color_distance),
            exact_count: exact_matches.len(),
        },
    };

    let start = clock.now();
    let mut stats = EdgeFilterStats::default();
    let similar_matches = crate::similar_matches(query, &ranked, config, &mut stats);
    let edge_filter = StageDiagnostics {
        duration: clock.elapsed(start),
        metrics: StageMetrics::EdgeFilter {
            pairs_evaluated: stats.evaluated,
            pairs_failed: stats.failed,
            pairs_passed: stats.passed,
        },
    };

    let summary = MatchSummary {
        query_width: dims.width,
        query_height: dims.height,
        gallery_size: gallery.len(),
        exact_count: exact_matches.len(),
        similar_count: similar_matches.len(),
    };
    let diagnostics = MatchDiagnostics {
        extract,
        rank: rank_stage,
        edge_filter,
        total_duration: clock.elapsed(total_start),
        summary,
    };

    Ok((
        MatchResult {
            exact_matches,
            similar_matches,
        },
        diagnostics,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::GalleryEntry;

    /// Clock that advances one millisecond per reading.
    #[derive(Default)]
    struct SteppingClock {
        ticks: Cell<u64>,
    }

    impl Clock for SteppingClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, start: u64) -> Duration {
            Duration::from_millis(self.now() - start)
        }
    }

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(16, 16, image::Rgba([value, value, value, 255]))
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        assert!((duration_ms(d) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_plain_result() {
        let gallery = Gallery::new(vec![
            GalleryEntry::new("same", solid(40)),
            GalleryEntry::new("lighter", solid(90)),
            GalleryEntry::new("broken", RgbaImage::new(0, 0)),
        ]);
        let config = MatchConfig::default();
        let query = solid(40);

        let plain = crate::match_tile(&query, &gallery, &config).unwrap();
        let (result, diag) =
            match_tile_with_diagnostics(&query, &gallery, &config, &SteppingClock::default())
                .unwrap();

        assert_eq!(result.exact_matches.len(), plain.exact_matches.len());
        assert_eq!(result.similar_matches.len(), plain.similar_matches.len());
        assert_eq!(diag.summary.gallery_size, 3);
        assert_eq!(diag.summary.exact_count, 1);
        assert_eq!(diag.summary.similar_count, 2);
        match diag.edge_filter.metrics {
            StageMetrics::EdgeFilter {
                pairs_evaluated,
                pairs_failed,
                pairs_passed,
            } => {
                assert_eq!(pairs_evaluated, 3);
                assert_eq!(pairs_failed, 1);
                assert_eq!(pairs_passed, 2);
            }
            ref other => unreachable!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn stage_durations_come_from_clock() {
        let gallery = Gallery::new(vec![GalleryEntry::new("only", solid(10))]);
        let (_, diag) = match_tile_with_diagnostics(
            &solid(10),
            &gallery,
            &MatchConfig::default(),
            &SteppingClock::default(),
        )
        .unwrap();
        // Each stage reads the clock twice.
        assert_eq!(diag.extract.duration, Duration::from_millis(1));
        assert_eq!(diag.rank.duration, Duration::from_millis(1));
        assert_eq!(diag.edge_filter.duration, Duration::from_millis(1));
        // Total spans the first and last readings.
        assert_eq!(diag.total_duration, Duration::from_millis(7));
    }

    #[test]
    fn empty_gallery_reports_no_minimum() {
        let gallery = Gallery::default();
        let (result, diag) = match_tile_with_diagnostics(
            &solid(0),
            &gallery,
            &MatchConfig::default(),
            &SystemClock,
        )
        .unwrap();
        assert!(result.is_empty());
        assert!(matches!(
            diag.rank.metrics,
            StageMetrics::Rank {
                candidate_count: 0,
                min_distance: None,
                exact_count: 0,
            }
        ));
        assert!(diag.report().contains("min=n/a"));
    }

    #[test]
    fn report_lists_every_stage() {
        let gallery = Gallery::new(vec![GalleryEntry::new("a", solid(30))]);
        let (_, diag) = match_tile_with_diagnostics(
            &solid(30),
            &gallery,
            &MatchConfig::default(),
            &SteppingClock::default(),
        )
        .unwrap();
        let report = diag.report();
        assert!(report.contains("Match Diagnostics Report"));
        assert!(report.contains("Extract"));
        assert!(report.contains("#1e1e1e"));
        assert!(report.contains("Edge Filter"));
        assert!(report.contains("Exact: 1  |  Similar: 1"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let gallery = Gallery::new(vec![GalleryEntry::new("a", solid(30))]);
        let (_, diag) = match_tile_with_diagnostics(
            &solid(30),
            &gallery,
            &MatchConfig::default(),
            &SteppingClock::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["extract"]["duration"].as_f64().unwrap() - 0.001).abs() < 1e-12);
        let back: MatchDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_duration, diag.total_duration);
    }
}
