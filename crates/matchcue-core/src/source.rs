use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;

// ---------------------------------------------------------------------------
// MatchInfo
// ---------------------------------------------------------------------------

/// Where a match is in its lifecycle, as reported by the competition source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    NotStarted,
    Running,
    Ended,
}

/// A snapshot of the current match as reported by the competition source.
///
/// Re-fetched on every poll tick; the core never caches one beyond the
/// immediately preceding observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchInfo {
    pub match_number: u32,
    pub scheduled_start: DateTime<Utc>,
    pub state: MatchState,
}

impl MatchInfo {
    /// Seconds of game time elapsed at `now` (negative before the start).
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.scheduled_start).num_milliseconds() as f64 / 1000.0
    }
}

// ---------------------------------------------------------------------------
// CompetitionSource
// ---------------------------------------------------------------------------

/// Capability to poll the competition service for the current match.
///
/// Implementations must bound every call (request timeout); a timed-out poll
/// surfaces as [`SourceError::Unavailable`] and is handled locally by the
/// poll loop.
#[async_trait]
pub trait CompetitionSource: Send + Sync {
    /// The current match, or `None` when no match slot is active.
    async fn current_match(&self) -> Result<Option<MatchInfo>, SourceError>;
}
