use chrono::{DateTime, Utc};

use crate::source::{MatchInfo, MatchState};

// ---------------------------------------------------------------------------
// TrackerState / Transition
// ---------------------------------------------------------------------------

/// The identity and start time of a match worth scheduling for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchStart {
    pub match_number: u32,
    pub start_time: DateTime<Utc>,
}

/// The tracker's belief about the current match.
///
/// `last_elapsed` is the game time observed on the previous poll; regression
/// detection compares against it and nothing older.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    Idle,
    Tracking {
        match_number: u32,
        start_time: DateTime<Utc>,
        last_elapsed: f64,
    },
}

/// What one poll observation means, relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Idle and still no schedulable match.
    NoMatch,
    /// A match to schedule for.
    Started(MatchStart),
    /// Same match, same start time.
    Continuing,
    /// Same match, start time moved without game time regressing beyond
    /// tolerance. Unfired fire times must be recomputed.
    Rescheduled(MatchStart),
    /// Normal completion. Unfired actions are dropped, never the abort set.
    Ended { match_number: u32 },
    /// Abnormal termination: superseded mid-match, game time regressed, or
    /// the match disappeared before its completion horizon. When a new match
    /// superseded the old one it is carried here so scheduling for it
    /// proceeds in the same tick.
    Aborted {
        match_number: u32,
        superseded_by: Option<MatchStart>,
    },
}

// ---------------------------------------------------------------------------
// MatchTracker
// ---------------------------------------------------------------------------

/// Tracks the current match across poll ticks and classifies each observation.
///
/// `horizon_secs` is the game time at which the tracked match counts as
/// complete: past it, disappearance or supersession is a normal end rather
/// than an abort. `tolerance_secs` bounds how far game time may move
/// backwards between two consecutive polls before the match is treated as
/// aborted.
#[derive(Debug)]
pub struct MatchTracker {
    state: TrackerState,
    horizon_secs: f64,
    tolerance_secs: f64,
}

impl MatchTracker {
    pub fn new(horizon_secs: f64, tolerance_secs: f64) -> Self {
        Self {
            state: TrackerState::Idle,
            horizon_secs,
            tolerance_secs,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Classify `latest` against the previous observation and update the
    /// tracked state. Called once per poll tick; all dispatch side effects
    /// belong to the scheduler.
    pub fn observe(&mut self, latest: Option<MatchInfo>, now: DateTime<Utc>) -> Transition {
        let transition = self.classify(latest, now);
        self.state = Self::next_state(&transition, &self.state, now);
        transition
    }

    /// Pure classification of one observation. No state change.
    pub fn classify(&self, latest: Option<MatchInfo>, now: DateTime<Utc>) -> Transition {
        match self.state {
            TrackerState::Idle => match latest {
                Some(m) if self.schedulable(&m, now) => Transition::Started(MatchStart {
                    match_number: m.match_number,
                    start_time: m.scheduled_start,
                }),
                _ => Transition::NoMatch,
            },

            TrackerState::Tracking {
                match_number,
                start_time,
                last_elapsed,
            } => {
                let tracked_elapsed = elapsed_secs(start_time, now);

                let Some(m) = latest else {
                    // Disappearance past the horizon is a normal end; before
                    // it, the match was cut short.
                    return if tracked_elapsed > self.horizon_secs {
                        Transition::Ended { match_number }
                    } else {
                        Transition::Aborted {
                            match_number,
                            superseded_by: None,
                        }
                    };
                };

                if m.match_number != match_number {
                    if tracked_elapsed > self.horizon_secs {
                        // The old match ran its course; this is a fresh slot.
                        return if self.schedulable(&m, now) {
                            Transition::Started(MatchStart {
                                match_number: m.match_number,
                                start_time: m.scheduled_start,
                            })
                        } else {
                            Transition::Ended { match_number }
                        };
                    }
                    let superseded_by = self.schedulable(&m, now).then(|| MatchStart {
                        match_number: m.match_number,
                        start_time: m.scheduled_start,
                    });
                    return Transition::Aborted {
                        match_number,
                        superseded_by,
                    };
                }

                if m.state == MatchState::Ended {
                    return Transition::Ended { match_number };
                }

                let new_elapsed = m.elapsed_at(now);
                if new_elapsed + self.tolerance_secs < last_elapsed {
                    return Transition::Aborted {
                        match_number,
                        superseded_by: None,
                    };
                }
                if new_elapsed > self.horizon_secs {
                    return Transition::Ended { match_number };
                }
                if m.scheduled_start != start_time {
                    return Transition::Rescheduled(MatchStart {
                        match_number,
                        start_time: m.scheduled_start,
                    });
                }
                Transition::Continuing
            }
        }
    }

    /// Whether a reported match is worth scheduling: not already ended, and
    /// not so old that every action is behind us.
    fn schedulable(&self, m: &MatchInfo, now: DateTime<Utc>) -> bool {
        m.state != MatchState::Ended && m.elapsed_at(now) <= self.horizon_secs
    }

    fn next_state(
        transition: &Transition,
        state: &TrackerState,
        now: DateTime<Utc>,
    ) -> TrackerState {
        match transition {
            Transition::NoMatch | Transition::Ended { .. } => TrackerState::Idle,

            Transition::Started(s) | Transition::Rescheduled(s) => TrackerState::Tracking {
                match_number: s.match_number,
                start_time: s.start_time,
                last_elapsed: elapsed_secs(s.start_time, now),
            },

            Transition::Continuing => match *state {
                TrackerState::Tracking {
                    match_number,
                    start_time,
                    ..
                } => TrackerState::Tracking {
                    match_number,
                    start_time,
                    last_elapsed: elapsed_secs(start_time, now),
                },
                TrackerState::Idle => TrackerState::Idle,
            },

            Transition::Aborted { superseded_by, .. } => match superseded_by {
                Some(s) => TrackerState::Tracking {
                    match_number: s.match_number,
                    start_time: s.start_time,
                    last_elapsed: elapsed_secs(s.start_time, now),
                },
                None => TrackerState::Idle,
            },
        }
    }
}

fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds() as f64 / 1000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
