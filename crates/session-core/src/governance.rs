//! Session governance: provider keepalive and the max-duration governor.
//!
//! Two independent periodic processes, started together when the session
//! reaches `Streaming` and stopped together on `Ending`. The governor's
//! countdown lives in a pure [`Countdown`] struct so the fire-once latch
//! behavior is testable without timers; the tasks here only drive it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rehearsal_avatar_interface::AvatarProvider;
use rehearsal_backend_api::{HeartbeatRequest, SessionBackend};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{GovernanceConfig, Timings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorEvent {
    Warning,
    Expired,
}

/// Remaining-seconds countdown with fire-once warning/expiry latches.
///
/// The latches guarantee each callback is invoked exactly once per session
/// no matter how many ticks (or backend reconciliations) cross a threshold.
#[derive(Debug)]
pub struct Countdown {
    remaining_sec: i64,
    warning_threshold_sec: i64,
    warning_fired: bool,
    expired_fired: bool,
}

impl Countdown {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            remaining_sec: config.max_duration_sec as i64,
            warning_threshold_sec: config.warning_threshold_sec as i64,
            warning_fired: false,
            expired_fired: false,
        }
    }

    pub fn remaining_sec(&self) -> i64 {
        self.remaining_sec
    }

    /// One local tick. Decrements and reports any threshold crossing.
    pub fn tick(&mut self) -> Option<GovernorEvent> {
        if self.expired_fired {
            return None;
        }
        self.remaining_sec = (self.remaining_sec - 1).max(0);
        self.check()
    }

    /// Correction from the backend's authoritative clock. Local drift is
    /// overwritten; the corrected value can itself cross a threshold.
    pub fn set_remaining(&mut self, remaining_sec: i64) -> Option<GovernorEvent> {
        self.remaining_sec = remaining_sec.max(0);
        self.check()
    }

    /// The backend declared the session over, regardless of local count.
    pub fn force_expire(&mut self) -> Option<GovernorEvent> {
        self.remaining_sec = 0;
        self.check()
    }

    /// The backend declared the warning active, regardless of local count.
    pub fn force_warning(&mut self) -> Option<GovernorEvent> {
        if self.expired_fired || self.warning_fired {
            return None;
        }
        self.warning_fired = true;
        Some(GovernorEvent::Warning)
    }

    fn check(&mut self) -> Option<GovernorEvent> {
        if self.remaining_sec <= 0 {
            if self.expired_fired {
                return None;
            }
            self.expired_fired = true;
            self.warning_fired = true;
            return Some(GovernorEvent::Expired);
        }
        if self.remaining_sec <= self.warning_threshold_sec && !self.warning_fired {
            self.warning_fired = true;
            return Some(GovernorEvent::Warning);
        }
        None
    }
}

/// Callbacks out of the governor. `on_expired` is what ends the session on
/// time limit; the countdown latches guarantee it runs at most once.
pub struct GovernanceHooks {
    pub on_remaining: Box<dyn Fn(i64) + Send + Sync>,
    pub on_warning: Box<dyn Fn() + Send + Sync>,
    pub on_expired: Box<dyn Fn() + Send + Sync>,
}

pub(crate) struct GovernanceIds {
    pub provider_session_id: String,
    pub backend_session_id: Option<String>,
}

/// Owns the keepalive and governor tasks for one streaming session. Both
/// run under one cancellation token; [`stop`](Governance::stop) cancels and
/// joins them so no timer can outlive the session.
pub struct Governance {
    cancel: CancellationToken,
    foreground: Arc<Notify>,
    tasks: Vec<JoinHandle<()>>,
}

impl Governance {
    pub(crate) fn start(
        provider: Arc<dyn AvatarProvider>,
        backend: Arc<dyn SessionBackend>,
        ids: GovernanceIds,
        config: GovernanceConfig,
        timings: &Timings,
        hooks: GovernanceHooks,
    ) -> Self {
        let cancel = CancellationToken::new();
        let foreground = Arc::new(Notify::new());
        let countdown = Arc::new(Mutex::new(Countdown::new(config)));

        let keepalive = tokio::spawn(keepalive_loop(
            provider,
            ids.provider_session_id.clone(),
            timings.keepalive_interval,
            cancel.clone(),
            foreground.clone(),
        ));

        let governor = tokio::spawn(governor_loop(
            backend,
            ids,
            countdown,
            timings.countdown_tick,
            timings.reconcile_interval,
            cancel.clone(),
            hooks,
        ));

        Self {
            cancel,
            foreground,
            tasks: vec![keepalive, governor],
        }
    }

    /// The application regained foreground visibility: ping immediately
    /// instead of waiting out the current keepalive interval.
    pub fn notify_foreground(&self) {
        self.foreground.notify_one();
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(error) = task.await
                && !error.is_cancelled()
            {
                tracing::warn!(%error, "governance_task_join_failed");
            }
        }
    }
}

async fn keepalive_loop(
    provider: Arc<dyn AvatarProvider>,
    provider_session_id: String,
    interval: Duration,
    cancel: CancellationToken,
    foreground: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = foreground.notified() => {
                ping(&*provider, &provider_session_id).await;
            }
            _ = tokio::time::sleep(interval) => {
                ping(&*provider, &provider_session_id).await;
            }
        }
    }
}

async fn ping(provider: &dyn AvatarProvider, provider_session_id: &str) {
    if let Err(error) = provider.keep_alive(provider_session_id).await {
        tracing::warn!(%error, "session_keepalive_failed");
    }
}

async fn governor_loop(
    backend: Arc<dyn SessionBackend>,
    ids: GovernanceIds,
    countdown: Arc<Mutex<Countdown>>,
    tick_interval: Duration,
    reconcile_interval: Duration,
    cancel: CancellationToken,
    hooks: GovernanceHooks,
) {
    let start = tokio::time::Instant::now();
    let mut tick = tokio::time::interval_at(start + tick_interval, tick_interval);
    let mut reconcile = tokio::time::interval_at(start + reconcile_interval, reconcile_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let (event, remaining) = {
                    let mut cd = countdown.lock().expect("countdown poisoned");
                    (cd.tick(), cd.remaining_sec())
                };
                (hooks.on_remaining)(remaining);
                dispatch(event, &hooks);
            }
            _ = reconcile.tick() => {
                let Some(backend_session_id) = ids.backend_session_id.as_deref() else {
                    continue;
                };
                let request = HeartbeatRequest {
                    session_id: backend_session_id.to_string(),
                    provider_session_id: ids.provider_session_id.clone(),
                };
                match backend.heartbeat(request).await {
                    Ok(response) => {
                        let events = {
                            let mut cd = countdown.lock().expect("countdown poisoned");
                            let mut events = Vec::new();
                            if response.expired || response.should_end {
                                events.push(cd.force_expire());
                            } else if let Some(remaining) = response.remaining_sec {
                                if (remaining - cd.remaining_sec()).abs() > 1 {
                                    tracing::debug!(
                                        local = cd.remaining_sec(),
                                        backend = remaining,
                                        "governor_drift_corrected"
                                    );
                                }
                                events.push(cd.set_remaining(remaining));
                                if response.warning_active {
                                    events.push(cd.force_warning());
                                }
                            }
                            events
                        };
                        for event in events {
                            dispatch(event, &hooks);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "governor_heartbeat_failed");
                    }
                }
            }
        }
    }
}

fn dispatch(event: Option<GovernorEvent>, hooks: &GovernanceHooks) {
    match event {
        Some(GovernorEvent::Warning) => {
            tracing::info!("session_time_warning");
            (hooks.on_warning)();
        }
        Some(GovernorEvent::Expired) => {
            tracing::info!("session_time_expired");
            (hooks.on_expired)();
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u64, warning: u64) -> GovernanceConfig {
        GovernanceConfig {
            max_duration_sec: max,
            warning_threshold_sec: warning,
        }
    }

    #[test]
    fn ticking_to_zero_fires_each_latch_once() {
        let mut cd = Countdown::new(config(65, 60));

        let mut warnings = 0;
        let mut expiries = 0;
        for _ in 0..80 {
            match cd.tick() {
                Some(GovernorEvent::Warning) => warnings += 1,
                Some(GovernorEvent::Expired) => expiries += 1,
                None => {}
            }
        }

        assert_eq!(warnings, 1);
        assert_eq!(expiries, 1);
        assert_eq!(cd.remaining_sec(), 0);
    }

    #[test]
    fn warning_fires_at_the_threshold() {
        let mut cd = Countdown::new(config(62, 60));

        assert_eq!(cd.tick(), None); // 61
        assert_eq!(cd.tick(), Some(GovernorEvent::Warning)); // 60
        assert_eq!(cd.tick(), None); // 59
    }

    #[test]
    fn reconcile_jump_past_both_thresholds_fires_expired_only_once() {
        let mut cd = Countdown::new(config(300, 60));

        assert_eq!(cd.set_remaining(0), Some(GovernorEvent::Expired));
        assert_eq!(cd.set_remaining(0), None);
        assert_eq!(cd.tick(), None);
    }

    #[test]
    fn reconcile_downward_correction_can_fire_warning() {
        let mut cd = Countdown::new(config(300, 60));

        assert_eq!(cd.tick(), None);
        assert_eq!(cd.set_remaining(45), Some(GovernorEvent::Warning));
        assert_eq!(cd.set_remaining(44), None);
    }

    #[test]
    fn reconcile_upward_correction_extends_the_countdown() {
        let mut cd = Countdown::new(config(10, 5));

        for _ in 0..4 {
            cd.tick();
        }
        assert_eq!(cd.set_remaining(120), None);
        assert_eq!(cd.remaining_sec(), 120);
    }

    #[test]
    fn force_warning_respects_the_latch() {
        let mut cd = Countdown::new(config(300, 60));

        assert_eq!(cd.force_warning(), Some(GovernorEvent::Warning));
        assert_eq!(cd.force_warning(), None);
    }

    #[test]
    fn expired_countdown_stops_ticking() {
        let mut cd = Countdown::new(config(1, 0));

        assert_eq!(cd.tick(), Some(GovernorEvent::Expired));
        assert_eq!(cd.tick(), None);
        assert_eq!(cd.remaining_sec(), 0);
    }
}
