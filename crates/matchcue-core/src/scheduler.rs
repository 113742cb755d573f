use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionSet};
use crate::source::{CompetitionSource, MatchInfo};
use crate::tracker::{MatchStart, MatchTracker, Transition};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the competition source is polled.
    pub poll_interval: StdDuration,
    /// How often due fires are evaluated between polls.
    pub fine_interval: StdDuration,
    /// Allowed backwards movement of game time between consecutive polls.
    pub tolerance_secs: f64,
    /// Length of the match segment of a slot; with the final action offset,
    /// this fixes the completion horizon.
    pub match_len_secs: f64,
}

// ---------------------------------------------------------------------------
// ScheduledFire / MatchSchedule
// ---------------------------------------------------------------------------

/// One pending dispatch: an index into the timed action list and the absolute
/// wall-clock moment it is due. Never reused across matches.
#[derive(Debug, Clone, PartialEq)]
struct ScheduledFire {
    index: usize,
    fire_at: DateTime<Utc>,
    fired: bool,
}

/// The fire set for one observed match, in config order.
#[derive(Debug, Clone)]
struct MatchSchedule {
    match_number: u32,
    fires: Vec<ScheduledFire>,
}

impl MatchSchedule {
    fn unfired(&self) -> usize {
        self.fires.iter().filter(|f| !f.fired).count()
    }
}

// ---------------------------------------------------------------------------
// ActionScheduler
// ---------------------------------------------------------------------------

/// The orchestrating core: polls the competition source, classifies each
/// observation through the tracker, maintains the per-match fire set, and
/// drives the transport.
///
/// All scheduling state is owned by this struct and mutated from a single
/// task that multiplexes the poll interval and the fine dispatch interval,
/// which is the serialization boundary for the whole engine.
pub struct ActionScheduler<S, T> {
    source: S,
    transport: T,
    actions: ActionSet,
    tracker: MatchTracker,
    config: SchedulerConfig,
    schedule: Option<MatchSchedule>,
    /// The fire flags of the most recently closed schedule, kept so that
    /// re-observing the same match (e.g. after an abort caused by a mid-match
    /// delay) never re-fires an already dispatched action.
    previous: Option<MatchSchedule>,
}

impl<S: CompetitionSource, T: Transport> ActionScheduler<S, T> {
    pub fn new(source: S, transport: T, actions: ActionSet, config: SchedulerConfig) -> Self {
        let horizon = config.match_len_secs.max(actions.last_offset().unwrap_or(0.0));
        let tracker = MatchTracker::new(horizon, config.tolerance_secs);
        Self {
            source,
            transport,
            actions,
            tracker,
            config,
            schedule: None,
            previous: None,
        }
    }

    /// Drive the poll loop forever. Cancel the future to shut down; unfired
    /// entries are abandoned without dispatch.
    pub async fn run(mut self) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fine = tokio::time::interval(self.config.fine_interval);
        fine.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_interval = ?self.config.poll_interval,
            fine_interval = ?self.config.fine_interval,
            actions = self.actions.timed.len(),
            abort_actions = self.actions.abort.len(),
            "scheduler running"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.poll_tick().await,
                _ = fine.tick() => self.dispatch_due(Utc::now()).await,
            }
        }
    }

    async fn poll_tick(&mut self) {
        let latest = match self.source.current_match().await {
            Ok(latest) => latest,
            Err(e) => {
                // A failed poll is not a "no match" report, but it must be
                // classified as one; the tracker only aborts on it when a
                // match was mid-flight.
                warn!(error = %e, "poll failed, treating as no current match");
                None
            }
        };
        self.handle_observation(latest, Utc::now()).await;
    }

    /// Apply one observation: classify, update timer state, dispatch.
    async fn handle_observation(&mut self, latest: Option<MatchInfo>, now: DateTime<Utc>) {
        match self.tracker.observe(latest, now) {
            Transition::NoMatch | Transition::Continuing => {}

            Transition::Started(start) => {
                info!(
                    match_number = start.match_number,
                    start_time = %start.start_time,
                    "match started"
                );
                self.schedule_match(start);
            }

            Transition::Rescheduled(start) => {
                info!(
                    match_number = start.match_number,
                    start_time = %start.start_time,
                    "match start time moved, recomputing fire times"
                );
                self.reschedule(start);
            }

            Transition::Ended { match_number } => {
                let dropped = self.close_schedule();
                info!(match_number, dropped, "match ended");
            }

            Transition::Aborted {
                match_number,
                superseded_by,
            } => {
                let dropped = self.close_schedule();
                warn!(
                    match_number,
                    dropped, "match ended abnormally, running abort actions"
                );
                self.run_abort(match_number).await;
                if let Some(next) = superseded_by {
                    info!(
                        match_number = next.match_number,
                        start_time = %next.start_time,
                        "match started"
                    );
                    self.schedule_match(next);
                }
            }
        }

        self.dispatch_due(now).await;
    }

    /// Build the fire set for a newly observed match. Entries already due
    /// fire on the `dispatch_due` that follows every observation, so a match
    /// discovered late still gets its past actions. When the match number is
    /// the one we last closed, its fire flags carry over instead.
    fn schedule_match(&mut self, start: MatchStart) {
        let resumed = self
            .previous
            .take()
            .filter(|p| p.match_number == start.match_number);
        if resumed.is_some() {
            debug!(
                match_number = start.match_number,
                "resuming a previously tracked match, fired actions carry over"
            );
        }

        let fires = self
            .actions
            .timed
            .iter()
            .enumerate()
            .map(|(index, timed)| ScheduledFire {
                index,
                fire_at: start.start_time + secs(timed.offset_secs),
                fired: resumed
                    .as_ref()
                    .map_or(false, |p| p.fires[index].fired),
            })
            .collect();

        self.schedule = Some(MatchSchedule {
            match_number: start.match_number,
            fires,
        });
    }

    /// Recompute unfired fire times from the new start. Fired entries are
    /// left alone; nothing un-fires.
    fn reschedule(&mut self, start: MatchStart) {
        let Some(schedule) = &mut self.schedule else {
            return;
        };
        for fire in schedule.fires.iter_mut().filter(|f| !f.fired) {
            fire.fire_at = start.start_time + secs(self.actions.timed[fire.index].offset_secs);
        }
    }

    /// Retire the active schedule, remembering its fire flags. Returns how
    /// many actions never fired (dropped silently on a normal end).
    fn close_schedule(&mut self) -> usize {
        match self.schedule.take() {
            Some(schedule) => {
                let dropped = schedule.unfired();
                self.previous = Some(schedule);
                dropped
            }
            None => 0,
        }
    }

    /// Dispatch every unfired entry that is due. Runs on every poll tick and
    /// every fine tick; order is config order, which is ascending fire time.
    async fn dispatch_due(&mut self, now: DateTime<Utc>) {
        let Some(schedule) = &mut self.schedule else {
            return;
        };
        let match_number = schedule.match_number;
        for fire in &mut schedule.fires {
            if fire.fired || fire.fire_at > now {
                continue;
            }
            // Marked before the send: a transport failure counts as
            // attempted and is never re-dispatched.
            fire.fired = true;
            let timed = &self.actions.timed[fire.index];
            debug!(
                offset_secs = timed.offset_secs,
                due = %fire.fire_at,
                "action due"
            );
            dispatch(&self.transport, &timed.action, match_number).await;
        }
    }

    /// Fire the abort set, in config order, substituting the aborted match's
    /// number.
    async fn run_abort(&mut self, match_number: u32) {
        for action in &self.actions.abort {
            dispatch(&self.transport, action, match_number).await;
        }
    }
}

/// Format and send one action. A transport failure is logged and swallowed;
/// it must not affect the actions that follow.
pub async fn dispatch<T: Transport>(transport: &T, action: &Action, match_number: u32) {
    let message = action.message_for(match_number);
    let args = action.args_for(match_number);
    info!(
        description = %action.description,
        device = %action.device,
        message = %message,
        match_number,
        "dispatching action"
    );
    if let Err(e) = transport.send(action.target, &message, &args).await {
        warn!(
            error = %e,
            device = %action.device,
            message = %message,
            "transport send failed"
        );
    }
}

fn secs(offset: f64) -> Duration {
    Duration::milliseconds((offset * 1000.0).round() as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TimedAction;
    use crate::error::{SourceError, TransportError};
    use crate::source::MatchState;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    // ─── Test doubles ─────────────────────────────────────────────────────

    /// Source stub for tests that drive `handle_observation` directly.
    struct NoSource;

    #[async_trait]
    impl CompetitionSource for NoSource {
        async fn current_match(&self) -> Result<Option<MatchInfo>, SourceError> {
            Ok(None)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        target: SocketAddr,
        message: String,
        args: Vec<String>,
    }

    /// Records every successful send; flips to failing when `fail` is set.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Sent>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn messages(&self) -> Vec<String> {
            self.sent().into_iter().map(|s| s.message).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(
            &self,
            target: SocketAddr,
            message: &str,
            args: &[String],
        ) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Encode {
                    message: message.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            self.sent.lock().unwrap().push(Sent {
                target,
                message: message.to_string(),
                args: args.to_vec(),
            });
            Ok(())
        }
    }

    // ─── Fixtures ─────────────────────────────────────────────────────────

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 13, 14, 0, 0).unwrap()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn timed(offset: f64, message: &str) -> TimedAction {
        TimedAction {
            offset_secs: offset,
            action: action(message),
        }
    }

    fn action(message: &str) -> Action {
        Action {
            device: "lighting".to_string(),
            target: addr(),
            message: message.to_string(),
            args: vec![],
            description: message.to_string(),
        }
    }

    fn action_set(timed_actions: Vec<TimedAction>, abort: Vec<Action>) -> ActionSet {
        ActionSet {
            timed: timed_actions,
            abort,
        }
    }

    fn scheduler(
        actions: ActionSet,
        tolerance_secs: f64,
    ) -> (ActionScheduler<NoSource, RecordingTransport>, RecordingTransport) {
        let transport = RecordingTransport::default();
        let config = SchedulerConfig {
            poll_interval: StdDuration::from_secs(1),
            fine_interval: StdDuration::from_millis(100),
            tolerance_secs,
            match_len_secs: 150.0,
        };
        (
            ActionScheduler::new(NoSource, transport.clone(), actions, config),
            transport,
        )
    }

    fn running(num: u32, start: DateTime<Utc>) -> Option<MatchInfo> {
        Some(MatchInfo {
            match_number: num,
            scheduled_start: start,
            state: MatchState::Running,
        })
    }

    fn not_started(num: u32, start: DateTime<Utc>) -> Option<MatchInfo> {
        Some(MatchInfo {
            match_number: num,
            scheduled_start: start,
            state: MatchState::NotStarted,
        })
    }

    fn secs_f(s: f64) -> Duration {
        Duration::milliseconds((s * 1000.0).round() as i64)
    }

    // ─── Scheduling & firing ──────────────────────────────────────────────

    #[tokio::test]
    async fn fires_action_at_its_offset_exactly_once() {
        let set = action_set(
            vec![timed(-10.0, "/set_color/{match_num}")],
            vec![],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        // Match 5 discovered in its pre slot, 20s before start.
        sched
            .handle_observation(not_started(5, t0()), t0() - secs_f(20.0))
            .await;
        assert!(transport.sent().is_empty());

        // Not due yet at T-11.
        sched.dispatch_due(t0() - secs_f(11.0)).await;
        assert!(transport.sent().is_empty());

        // Due at T-10.
        sched.dispatch_due(t0() - secs_f(10.0)).await;
        assert_eq!(
            transport.sent(),
            vec![Sent {
                target: addr(),
                message: "/set_color/5".to_string(),
                args: vec![],
            }]
        );

        // Later ticks and identical polls never re-fire.
        sched.dispatch_due(t0() - secs_f(9.0)).await;
        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        sched
            .handle_observation(running(5, t0()), t0() + secs_f(2.0))
            .await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn late_discovery_fires_past_actions_immediately() {
        let set = action_set(
            vec![timed(-10.0, "/pre"), timed(0.0, "/start"), timed(60.0, "/late")],
            vec![],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        // Discovered 30s in: the -10s and 0s cues are behind us.
        sched
            .handle_observation(running(7, t0()), t0() + secs_f(30.0))
            .await;
        assert_eq!(transport.messages(), vec!["/pre", "/start"]);

        sched.dispatch_due(t0() + secs_f(60.0)).await;
        assert_eq!(transport.messages(), vec!["/pre", "/start", "/late"]);
    }

    #[tokio::test]
    async fn simultaneous_fires_keep_config_order() {
        let set = action_set(
            vec![timed(0.0, "/first"), timed(0.0, "/second")],
            vec![],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(3, t0()), t0() + secs_f(1.0))
            .await;
        assert_eq!(transport.messages(), vec!["/first", "/second"]);
    }

    #[tokio::test]
    async fn normal_end_drops_unfired_actions_silently() {
        let set = action_set(
            vec![timed(0.0, "/start"), timed(120.0, "/never")],
            vec![action("/abort")],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        // The source reports the match over well before the /never cue.
        sched
            .handle_observation(
                Some(MatchInfo {
                    match_number: 5,
                    scheduled_start: t0(),
                    state: MatchState::Ended,
                }),
                t0() + secs_f(30.0),
            )
            .await;
        // No abort, no /never — even long after its original fire time.
        sched.dispatch_due(t0() + secs_f(300.0)).await;
        assert_eq!(transport.messages(), vec!["/start"]);
    }

    #[tokio::test]
    async fn time_regression_fires_abort_set_once() {
        let set = action_set(
            vec![timed(0.0, "/start"), timed(100.0, "/later")],
            vec![action("/abort_a"), action("/abort_b")],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(60.0))
            .await;
        assert_eq!(transport.messages(), vec!["/start"]);

        // A delay is added: start jumps 2 minutes later.
        let delayed = t0() + secs_f(120.0);
        sched
            .handle_observation(running(5, delayed), t0() + secs_f(62.0))
            .await;
        assert_eq!(
            transport.messages(),
            vec!["/start", "/abort_a", "/abort_b"]
        );

        // The regressed match is re-tracked on the next poll, but /start
        // stays fired and only the still-future cue remains.
        sched
            .handle_observation(running(5, delayed), t0() + secs_f(64.0))
            .await;
        assert_eq!(
            transport.messages(),
            vec!["/start", "/abort_a", "/abort_b"]
        );
        sched.dispatch_due(delayed + secs_f(100.0)).await;
        assert_eq!(
            transport.messages(),
            vec!["/start", "/abort_a", "/abort_b", "/later"]
        );
    }

    #[tokio::test]
    async fn abort_substitutes_the_aborted_match_number() {
        let set = action_set(
            vec![timed(0.0, "/start")],
            vec![action("/stop/{match_num}")],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(42, t0()), t0() + secs_f(1.0))
            .await;
        sched.handle_observation(None, t0() + secs_f(3.0)).await;
        assert_eq!(transport.messages(), vec!["/start", "/stop/42"]);
    }

    #[tokio::test]
    async fn supersession_aborts_old_match_and_schedules_new() {
        let set = action_set(
            vec![timed(0.0, "/start/{match_num}")],
            vec![action("/abort/{match_num}")],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;

        // Match 6 appears mid-match; its start is already past, so its
        // start cue fires in the same tick, after the aborts for 5.
        let next_start = t0() + secs_f(10.0);
        sched
            .handle_observation(running(6, next_start), t0() + secs_f(12.0))
            .await;
        assert_eq!(
            transport.messages(),
            vec!["/start/5", "/abort/5", "/start/6"]
        );
    }

    #[tokio::test]
    async fn reschedule_moves_unfired_cues_without_refiring() {
        let set = action_set(
            vec![timed(0.0, "/start"), timed(30.0, "/mid")],
            vec![],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        assert_eq!(transport.messages(), vec!["/start"]);

        // Start slips 300ms (within tolerance): /mid is now due at
        // T+30.3, so it must not fire at T+30.1.
        let new_start = t0() + secs_f(0.3);
        sched
            .handle_observation(running(5, new_start), t0() + secs_f(2.0))
            .await;
        sched.dispatch_due(t0() + secs_f(30.1)).await;
        assert_eq!(transport.messages(), vec!["/start"]);
        sched.dispatch_due(t0() + secs_f(30.3)).await;
        assert_eq!(transport.messages(), vec!["/start", "/mid"]);
    }

    #[tokio::test]
    async fn transport_failure_marks_attempted_and_continues() {
        let set = action_set(
            vec![timed(0.0, "/one"), timed(0.0, "/two")],
            vec![],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        transport.fail.store(true, Ordering::SeqCst);
        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        assert!(transport.sent().is_empty());

        // Sends work again, but the failed actions were attempted and stay
        // fired.
        transport.fail.store(false, Ordering::SeqCst);
        sched.dispatch_due(t0() + secs_f(2.0)).await;
        sched
            .handle_observation(running(5, t0()), t0() + secs_f(3.0))
            .await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn source_failure_mid_match_aborts_via_poll_tick() {
        // Drive through poll_tick with a failing source to cover the
        // poll-failure-as-none mapping end to end.
        struct FailingSource;

        #[async_trait]
        impl CompetitionSource for FailingSource {
            async fn current_match(&self) -> Result<Option<MatchInfo>, SourceError> {
                Err(SourceError::Unavailable("connection refused".to_string()))
            }
        }

        let transport = RecordingTransport::default();
        let config = SchedulerConfig {
            poll_interval: StdDuration::from_secs(1),
            fine_interval: StdDuration::from_millis(100),
            tolerance_secs: 0.5,
            match_len_secs: 150.0,
        };
        let set = action_set(vec![timed(0.0, "/start")], vec![action("/abort")]);
        let mut sched = ActionScheduler::new(FailingSource, transport.clone(), set, config);

        // No match tracked: a failed poll is a quiet tick.
        sched.poll_tick().await;
        assert!(transport.sent().is_empty());

        // Track a match, then fail the next poll: that is an abort.
        sched
            .handle_observation(running(5, Utc::now()), Utc::now())
            .await;
        sched.poll_tick().await;
        assert_eq!(transport.messages(), vec!["/start", "/abort"]);
    }

    #[tokio::test]
    async fn horizon_extends_to_post_slot_actions() {
        // Final cue at match+30: disappearance between match end and that
        // cue must not abort, and the cue itself must still fire.
        let set = action_set(
            vec![timed(0.0, "/start"), timed(180.0, "/post")],
            vec![action("/abort")],
        );
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        sched
            .handle_observation(running(5, t0()), t0() + secs_f(170.0))
            .await;
        sched.dispatch_due(t0() + secs_f(180.0)).await;
        assert_eq!(transport.messages(), vec!["/start", "/post"]);

        // Gone after the final cue: normal end, no abort.
        sched.handle_observation(None, t0() + secs_f(185.0)).await;
        assert_eq!(transport.messages(), vec!["/start", "/post"]);
    }

    #[tokio::test]
    async fn args_carry_placeholder_substitution() {
        let mut set = action_set(vec![timed(0.0, "/set_color/{match_num}")], vec![]);
        set.timed[0].action.args = vec!["#FF0000".to_string()];
        let (mut sched, transport) = scheduler(set, 0.5);

        sched
            .handle_observation(running(5, t0()), t0() + secs_f(1.0))
            .await;
        assert_eq!(
            transport.sent(),
            vec![Sent {
                target: addr(),
                message: "/set_color/5".to_string(),
                args: vec!["#FF0000".to_string()],
            }]
        );
    }
}
