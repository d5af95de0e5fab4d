//! Query supersession.
//!
//! Every new capture or upload supersedes the one before it. A
//! [`MatchSession`] owns the gallery and config, stamps each query with
//! a generation, and only delivers results whose generation is still
//! current. Superseded work is not cancelled; its result is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use tessella_match::{Gallery, MatchConfig, MatchError, MatchResult, RgbaImage};

use crate::capture::{AcquireError, CaptureSource};

/// Generation stamp handed out for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    /// The raw generation number.
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// What became of one query.
#[derive(Debug)]
pub enum QueryOutcome<'g> {
    /// The query ran to completion and is still current.
    Matched(MatchResult<'g>),
    /// A newer query was started; this result was discarded.
    Superseded,
    /// The query could not be acquired or matched.
    Failed(QueryError),
}

/// Failures that stop a query before a result exists.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The capture source failed.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The matcher rejected the query.
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// A loaded gallery plus the bookkeeping for superseding queries.
#[derive(Debug)]
pub struct MatchSession {
    gallery: Gallery,
    config: MatchConfig,
    generation: AtomicU64,
}

impl MatchSession {
    /// Create a session over a loaded gallery.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidConfig`] if `config` is unusable.
    pub fn new(gallery: Gallery, config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self {
            gallery,
            config,
            generation: AtomicU64::new(0),
        })
    }

    /// The session's gallery.
    #[must_use]
    pub const fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// The session's configuration.
    #[must_use]
    pub const fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Start a new query, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `ticket` belongs to the most recent query.
    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Match an already acquired query bitmap under `ticket`.
    pub fn run(&self, ticket: Ticket, query: &RgbaImage) -> QueryOutcome<'_> {
        if !self.is_current(ticket) {
            return self.superseded(ticket);
        }
        let result = match tessella_match::match_tile(query, &self.gallery, &self.config) {
            Ok(result) => result,
            Err(e) => return QueryOutcome::Failed(e.into()),
        };
        if !self.is_current(ticket) {
            return self.superseded(ticket);
        }
        tracing::info!(
            generation = ticket.0,
            exact = result.exact_matches.len(),
            similar = result.similar_matches.len(),
            "match complete"
        );
        QueryOutcome::Matched(result)
    }

    /// Start a query, acquire its bitmap from `source`, and match it.
    ///
    /// Acquisition failures are logged and no comparison is attempted.
    pub fn submit<S: CaptureSource + ?Sized>(&self, source: &mut S) -> QueryOutcome<'_> {
        let ticket = self.begin();
        match source.acquire() {
            Ok(query) => self.run(ticket, &query),
            Err(e) => {
                tracing::warn!(
                    generation = ticket.0,
                    source = %source.describe(),
                    error = %e,
                    "query acquisition failed, skipping match"
                );
                QueryOutcome::Failed(e.into())
            }
        }
    }

    fn superseded(&self, ticket: Ticket) -> QueryOutcome<'_> {
        tracing::debug!(
            generation = ticket.0,
            current = self.generation.load(Ordering::SeqCst),
            "discarding superseded query"
        );
        QueryOutcome::Superseded
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tessella_match::GalleryEntry;

    use super::*;
    use crate::capture::CaptureError;

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 8, image::Rgba([value, value, value, 255]))
    }

    fn session() -> MatchSession {
        let gallery = Gallery::new(vec![
            GalleryEntry::new("dark", solid(10)),
            GalleryEntry::new("light", solid(200)),
        ]);
        MatchSession::new(gallery, MatchConfig::default()).unwrap()
    }

    struct Fixed(Option<RgbaImage>);

    impl CaptureSource for Fixed {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn acquire(&mut self) -> Result<RgbaImage, AcquireError> {
            self.0.take().ok_or(AcquireError::Capture(CaptureError::PermissionDenied))
        }
    }

    #[test]
    fn generations_increase() {
        let session = session();
        let a = session.begin();
        let b = session.begin();
        assert!(b > a);
        assert_eq!(b.generation(), a.generation() + 1);
        assert!(session.is_current(b));
        assert!(!session.is_current(a));
    }

    #[test]
    fn current_ticket_gets_result() {
        let session = session();
        let ticket = session.begin();
        match session.run(ticket, &solid(10)) {
            QueryOutcome::Matched(result) => {
                assert_eq!(result.exact_matches[0].entry.name(), "dark");
            }
            other => unreachable!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let session = session();
        let old = session.begin();
        let _new = session.begin();
        assert!(matches!(session.run(old, &solid(10)), QueryOutcome::Superseded));
    }

    #[test]
    fn submit_matches_acquired_image() {
        let session = session();
        let outcome = session.submit(&mut Fixed(Some(solid(200))));
        assert!(matches!(
            outcome,
            QueryOutcome::Matched(ref r) if r.exact_matches[0].entry.name() == "light"
        ));
    }

    #[test]
    fn failed_acquisition_skips_match() {
        let session = session();
        let outcome = session.submit(&mut Fixed(None));
        assert!(matches!(
            outcome,
            QueryOutcome::Failed(QueryError::Acquire(AcquireError::Capture(
                CaptureError::PermissionDenied
            )))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = MatchConfig {
            color_quantization_bits: 0,
            ..MatchConfig::default()
        };
        assert!(MatchSession::new(Gallery::default(), config).is_err());
    }

    #[test]
    fn session_is_shareable_across_threads() {
        let session = session();
        let tickets: Vec<Ticket> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| session.begin())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let mut generations: Vec<u64> = tickets.iter().map(|t| t.generation()).collect();
        generations.sort_unstable();
        assert_eq!(generations, [1, 2, 3, 4]);
        assert!(tickets.iter().filter(|t| session.is_current(**t)).count() == 1);
    }
}
