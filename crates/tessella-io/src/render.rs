//! Result rendering.
//!
//! [`MatchReport`] is the serializable view of a
//! [`MatchResult`](tessella_match::MatchResult). [`text`] renders it for
//! a terminal and [`json`] for other programs. "No tile found" is its
//! own status and message, never an empty list presented as success.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tessella_match::diagnostics::MatchDiagnostics;
use tessella_match::{MatchResult, ScoredCandidate};

/// Heading shown above exact matches.
pub const EXACT_HEADING: &str = "Identical tile found";
/// Heading shown above similar matches.
pub const SIMILAR_HEADING: &str = "Similar tiles found";
/// Message shown when neither list has an entry.
pub const NO_MATCH_MESSAGE: &str = "No tile found";

/// Overall result of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// At least one entry is under the exact-match threshold.
    Exact,
    /// No exact match, but some entries passed the edge test.
    Similar,
    /// Both lists are empty.
    NoMatch,
}

/// One matched gallery tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Display name.
    pub name: String,
    /// Position in the gallery.
    pub gallery_index: usize,
    /// Color distance to the query.
    pub color_distance: f64,
}

impl From<&ScoredCandidate<'_>> for ReportEntry {
    fn from(candidate: &ScoredCandidate<'_>) -> Self {
        Self {
            name: candidate.entry.name().to_string(),
            gallery_index: candidate.index,
            color_distance: candidate.color_distance,
        }
    }
}

/// Serializable view of a match result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Overall status.
    pub status: MatchStatus,
    /// Exact matches, closest first.
    pub exact_matches: Vec<ReportEntry>,
    /// Similar matches, closest first.
    pub similar_matches: Vec<ReportEntry>,
}

impl MatchReport {
    /// Build a report from a match result.
    #[must_use]
    pub fn new(result: &MatchResult<'_>) -> Self {
        let status = if !result.exact_matches.is_empty() {
            MatchStatus::Exact
        } else if !result.similar_matches.is_empty() {
            MatchStatus::Similar
        } else {
            MatchStatus::NoMatch
        };
        Self {
            status,
            exact_matches: result.exact_matches.iter().map(ReportEntry::from).collect(),
            similar_matches: result.similar_matches.iter().map(ReportEntry::from).collect(),
        }
    }
}

/// Render a result for humans.
#[must_use]
pub fn text(result: &MatchResult<'_>) -> String {
    let report = MatchReport::new(result);
    if report.status == MatchStatus::NoMatch {
        return format!("{NO_MATCH_MESSAGE}\n");
    }

    let mut out = String::new();
    for (heading, entries) in [
        (EXACT_HEADING, &report.exact_matches),
        (SIMILAR_HEADING, &report.similar_matches),
    ] {
        if entries.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "{heading}");
        for entry in entries {
            let _ = writeln!(
                out,
                "  {} (#{}, distance {:.2})",
                entry.name, entry.gallery_index, entry.color_distance
            );
        }
    }
    out
}

/// JSON document: the report, plus diagnostics when they were collected.
#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    report: MatchReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a MatchDiagnostics>,
}

/// Render a result as pretty-printed JSON, with a `diagnostics` object
/// alongside the report fields when `diagnostics` is given.
///
/// # Errors
///
/// Returns the serializer's error.
pub fn json(
    result: &MatchResult<'_>,
    diagnostics: Option<&MatchDiagnostics>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput {
        report: MatchReport::new(result),
        diagnostics,
    })
}
