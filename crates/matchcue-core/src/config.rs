use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// SlotLengths
// ---------------------------------------------------------------------------

/// Lengths of the pre/match/post segments of a match slot, in seconds.
///
/// Only used to validate action offsets at load time (and by the simulator);
/// scheduling itself works purely from the reported start time.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SlotLengths {
    #[serde(default = "default_pre")]
    pub pre: f64,
    #[serde(rename = "match", default = "default_match")]
    pub match_len: f64,
    #[serde(default = "default_post")]
    pub post: f64,
}

fn default_pre() -> f64 {
    60.0
}

fn default_match() -> f64 {
    150.0
}

fn default_post() -> f64 {
    90.0
}

impl Default for SlotLengths {
    fn default() -> Self {
        Self {
            pre: default_pre(),
            match_len: default_match(),
            post: default_post(),
        }
    }
}

impl SlotLengths {
    /// Total slot length in seconds.
    pub fn total(&self) -> f64 {
        self.pre + self.match_len + self.post
    }
}

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

/// One action entry as written in the config file, before compilation.
///
/// `offset` is required for normal actions and forbidden for abort actions;
/// both rules are enforced when the [`crate::action::ActionSet`] is compiled.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub offset: Option<f64>,
    pub device: String,
    pub message: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub description: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_url: String,

    /// How often the competition source is polled, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// How often due fires are evaluated between polls, in seconds.
    #[serde(default = "default_fine_interval")]
    pub fine_interval_secs: f64,

    /// How far reported game time may move backwards between two consecutive
    /// polls before the match is treated as aborted. Zero means any decrease
    /// aborts.
    #[serde(default = "default_tolerance")]
    pub time_regression_tolerance_secs: f64,

    /// Request timeout for a single poll, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,

    #[serde(default)]
    pub slot: SlotLengths,

    /// Device name -> "host:port" UDP address.
    #[serde(default)]
    pub devices: HashMap<String, String>,

    #[serde(default)]
    pub actions: Vec<ActionSpec>,

    #[serde(default)]
    pub abort_actions: Vec<ActionSpec>,
}

fn default_poll_interval() -> f64 {
    2.0
}

fn default_fine_interval() -> f64 {
    0.1
}

fn default_tolerance() -> f64 {
    0.5
}

fn default_request_timeout() -> f64 {
    2.0
}

impl Config {
    /// Load a config file, stripping `//` comment lines before parsing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&strip_comments(&raw))?;
        config.validate_intervals()?;
        Ok(config)
    }

    fn validate_intervals(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("fine_interval_secs", self.fine_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveInterval { name, value });
            }
        }
        if self.time_regression_tolerance_secs < 0.0 {
            return Err(ConfigError::NonPositiveInterval {
                name: "time_regression_tolerance_secs",
                value: self.time_regression_tolerance_secs,
            });
        }
        Ok(())
    }
}

/// Blank out lines whose first non-whitespace characters are `//`.
fn strip_comments(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            if line.trim_start().starts_with("//") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
