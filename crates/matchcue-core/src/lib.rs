//! `matchcue-core` — match tracking and cue scheduling.
//!
//! The engine polls a competition timing service, tracks the live match, and
//! fires time-relative commands at show devices:
//!
//! ```text
//! poll loop ──► CompetitionSource::current_match()
//!                    │
//!                    ▼
//!               MatchTracker::observe()   ← pure classification per tick
//!                    │
//!                    ▼
//!               ActionScheduler           ← fire set, due evaluation, aborts
//!                    │
//!                    ▼
//!               Transport::send()
//! ```
//!
//! The crate is transport- and source-agnostic: `srcomp-client` and
//! `matchcue-osc` provide the production implementations of the two traits,
//! and tests drive the engine with synthetic observations.

pub mod action;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod source;
pub mod tracker;
pub mod transport;

pub use action::{Action, ActionSet, TimedAction, MATCH_NUM_PLACEHOLDER};
pub use config::{Config, SlotLengths};
pub use error::{ConfigError, SourceError, TransportError};
pub use scheduler::{dispatch, ActionScheduler, SchedulerConfig};
pub use source::{CompetitionSource, MatchInfo, MatchState};
pub use tracker::{MatchStart, MatchTracker, TrackerState, Transition};
pub use transport::Transport;
