//! A simulated competition API for rehearsals: serves the SRComp `/current`
//! shape from a synthetic schedule of back-to-back match slots.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use matchcue_core::SlotLengths;

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub start_time: DateTime<Utc>,
    pub start_num: u32,
    pub end_num: Option<u32>,
    pub slot: SlotLengths,
}

impl SimConfig {
    pub fn new(slot: SlotLengths, start_delay_secs: f64, start_num: u32, end_num: Option<u32>) -> Self {
        Self {
            start_time: Utc::now() + secs(start_delay_secs),
            start_num,
            end_num,
            slot,
        }
    }

    /// An endless schedule whose first slot begins immediately.
    pub fn starting_now(slot: SlotLengths) -> Self {
        Self::new(slot, 0.0, 0, None)
    }
}

// ---------------------------------------------------------------------------
// Schedule math
// ---------------------------------------------------------------------------

/// Match number and game start time of the slot covering `now`, if any.
fn slot_at(config: &SimConfig, now: DateTime<Utc>) -> Option<(u32, DateTime<Utc>)> {
    let elapsed = (now - config.start_time).num_milliseconds() as f64 / 1000.0;
    if elapsed < 0.0 {
        return None;
    }

    let slot_len = config.slot.total();
    let index = (elapsed / slot_len).floor() as u32;
    let num = config.start_num + index;
    if config.end_num.is_some_and(|end| num > end) {
        return None;
    }

    let game_start = config.start_time + secs(f64::from(index) * slot_len + config.slot.pre);
    Some((num, game_start))
}

fn secs(s: f64) -> Duration {
    Duration::milliseconds((s * 1000.0).round() as i64)
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

async fn current(State(config): State<SimConfig>) -> Json<Value> {
    Json(current_payload(&config, Utc::now()))
}

fn current_payload(config: &SimConfig, now: DateTime<Utc>) -> Value {
    let Some((num, game_start)) = slot_at(config, now) else {
        return json!({"matches": [], "time": now.to_rfc3339()});
    };

    let game_time = (now - game_start).num_milliseconds() as f64 / 1000.0;
    let phase = if game_time < 0.0 {
        "pre"
    } else if game_time < config.slot.match_len {
        "match"
    } else {
        "post"
    };

    json!({
        "matches": [{
            "num": num,
            "times": {"game": {"start": game_start.to_rfc3339()}}
        }],
        "time": now.to_rfc3339(),
        "_debug": {
            "game_time": game_time,
            "match_phase": phase,
        },
    })
}

pub fn router(config: SimConfig) -> Router {
    Router::new()
        .route("/current", get(current))
        .with_state(config)
}

pub async fn serve(listener: TcpListener, config: SimConfig) -> std::io::Result<()> {
    axum::serve(listener, router(config)).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
