use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The `GET /current` payload.
///
/// `time` is the compbox's own clock; game time is always derived from it
/// rather than the local clock, so a skewed local clock cannot shift cues.
/// Matches missing their game start time are treated as "no current match",
/// which is what the API reports between scheduled games.
#[derive(Debug, Deserialize)]
pub struct CurrentResponse {
    #[serde(default)]
    pub matches: Vec<CurrentMatch>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentMatch {
    pub num: u32,
    #[serde(default)]
    pub times: Option<MatchTimes>,
}

#[derive(Debug, Deserialize)]
pub struct MatchTimes {
    #[serde(default)]
    pub game: Option<GameTimes>,
}

#[derive(Debug, Deserialize)]
pub struct GameTimes {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

impl CurrentMatch {
    pub fn game_start(&self) -> Option<DateTime<Utc>> {
        self.times.as_ref()?.game.as_ref()?.start
    }
}
