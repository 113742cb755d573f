use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;

use matchcue_core::{CompetitionSource, MatchInfo, MatchState, SourceError};

use crate::types::CurrentResponse;

// ─── SrcompClient ─────────────────────────────────────────────────────────

/// HTTP client for the SRComp `/current` endpoint.
///
/// `active_window` is the span from game start to the end of the slot; a
/// match older than that is reported as ended so the tracker never schedules
/// a slot that is already behind us.
pub struct SrcompClient {
    http: reqwest::Client,
    base_url: String,
    active_window: Duration,
}

impl SrcompClient {
    /// Every request carries `timeout`; a timed-out poll surfaces as
    /// [`SourceError::Unavailable`].
    pub fn new(
        base_url: impl Into<String>,
        active_window_secs: f64,
        timeout: StdDuration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            active_window: Duration::milliseconds((active_window_secs * 1000.0).round() as i64),
        })
    }
}

#[async_trait]
impl CompetitionSource for SrcompClient {
    async fn current_match(&self) -> Result<Option<MatchInfo>, SourceError> {
        let url = format!("{}/current", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let payload: CurrentResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let Some(current) = payload.matches.first() else {
            debug!("no current match");
            return Ok(None);
        };
        let Some(start) = current.game_start() else {
            debug!(match_number = current.num, "current match has no game start");
            return Ok(None);
        };

        let api_now = payload.time;
        let game_time = (api_now - start).num_milliseconds() as f64 / 1000.0;
        let clock_diff_ms = (Utc::now() - api_now).num_milliseconds();
        debug!(
            game_time,
            match_number = current.num,
            clock_diff_ms,
            "received game time"
        );

        let state = if api_now < start {
            MatchState::NotStarted
        } else if api_now - start <= self.active_window {
            MatchState::Running
        } else {
            MatchState::Ended
        };

        Ok(Some(MatchInfo {
            match_number: current.num,
            scheduled_start: start,
            state,
        }))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;

    const WINDOW: f64 = 240.0;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 13, 12, 0, 0).unwrap()
    }

    fn client(base_url: &str) -> SrcompClient {
        SrcompClient::new(base_url, WINDOW, StdDuration::from_secs(2)).unwrap()
    }

    fn payload(num: u32, start: DateTime<Utc>, now: DateTime<Utc>) -> String {
        json!({
            "matches": [{
                "num": num,
                "times": {"game": {"start": start.to_rfc3339()}}
            }],
            "time": now.to_rfc3339(),
        })
        .to_string()
    }

    async fn mock_current(server: &mut mockito::ServerGuard, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/current")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn reports_running_match() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_current(&mut server, &payload(12, t0(), t0() + Duration::seconds(30))).await;

        let info = client(&server.url()).current_match().await.unwrap().unwrap();
        assert_eq!(info.match_number, 12);
        assert_eq!(info.scheduled_start, t0());
        assert_eq!(info.state, MatchState::Running);
    }

    #[tokio::test]
    async fn reports_upcoming_match_as_not_started() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_current(&mut server, &payload(12, t0(), t0() - Duration::seconds(45))).await;

        let info = client(&server.url()).current_match().await.unwrap().unwrap();
        assert_eq!(info.state, MatchState::NotStarted);
    }

    #[tokio::test]
    async fn reports_old_match_as_ended() {
        let mut server = mockito::Server::new_async().await;
        let stale_now = t0() + Duration::seconds(WINDOW as i64 + 10);
        let _m = mock_current(&mut server, &payload(12, t0(), stale_now)).await;

        let info = client(&server.url()).current_match().await.unwrap().unwrap();
        assert_eq!(info.state, MatchState::Ended);
    }

    #[tokio::test]
    async fn state_derives_from_api_clock_not_local_clock() {
        // The compbox clock says 30s in, regardless of what the local clock
        // reads while the test runs.
        let mut server = mockito::Server::new_async().await;
        let start = Utc.with_ymd_and_hms(2019, 1, 1, 9, 0, 0).unwrap();
        let _m = mock_current(&mut server, &payload(1, start, start + Duration::seconds(30))).await;

        let info = client(&server.url()).current_match().await.unwrap().unwrap();
        assert_eq!(info.state, MatchState::Running);
    }

    #[tokio::test]
    async fn empty_matches_means_no_match() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({"matches": [], "time": t0().to_rfc3339()}).to_string();
        let _m = mock_current(&mut server, &body).await;

        assert!(client(&server.url()).current_match().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn match_without_game_start_means_no_match() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "matches": [{"num": 3, "times": {}}],
            "time": t0().to_rfc3339(),
        })
        .to_string();
        let _m = mock_current(&mut server, &body).await;

        assert!(client(&server.url()).current_match().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/current")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server.url()).current_match().await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        // Nothing listens here.
        let err = client("http://127.0.0.1:1/api")
            .current_match()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_current(&mut server, "not json at all").await;

        let err = client(&server.url()).current_match().await.unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let mut server = mockito::Server::new_async().await;
        let _m = mock_current(&mut server, &payload(12, t0(), t0() + Duration::seconds(1))).await;

        let base = format!("{}/", server.url());
        assert!(client(&base).current_match().await.unwrap().is_some());
    }
}
