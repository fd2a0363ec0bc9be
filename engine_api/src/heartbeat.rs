//! Warns when a post-merge chain is not being driven by a consensus client.

use core::time::Duration;
use std::{sync::Arc, time::Instant};

use futures::{channel::mpsc::UnboundedReceiver, StreamExt as _};
use logging::warn_with_head;
use parking_lot::Mutex;
use types::config::Config;

const NO_BEACON_CLIENT: &str =
    "Post-merge network, but no beacon client seen. Please launch one to follow the chain!";

const NO_CONSENSUS_UPDATES: &str = "Beacon client online, but never received consensus \
                                    updates. Please ensure your beacon client is operational \
                                    to follow the chain!";

const STALE_CONSENSUS_UPDATES: &str = "Beacon client online, but no consensus updates \
                                       received in a while. Please fix your beacon client to \
                                       follow the chain!";

/// Times of the latest calls from the consensus client.
#[derive(Default)]
pub struct Activity {
    last_transition_update: Mutex<Option<Instant>>,
    last_forkchoice_update: Mutex<Option<Instant>>,
    last_new_payload: Mutex<Option<Instant>>,
}

impl Activity {
    pub fn record_transition_update(&self) {
        *self.last_transition_update.lock() = Some(Instant::now());
    }

    pub fn record_forkchoice_update(&self) {
        *self.last_forkchoice_update.lock() = Some(Instant::now());
    }

    pub fn record_new_payload(&self) {
        *self.last_new_payload.lock() = Some(Instant::now());
    }

    #[must_use]
    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            last_transition_update: *self.last_transition_update.lock(),
            last_forkchoice_update: *self.last_forkchoice_update.lock(),
            last_new_payload: *self.last_new_payload.lock(),
        }
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct ActivitySnapshot {
    pub last_transition_update: Option<Instant>,
    pub last_forkchoice_update: Option<Instant>,
    pub last_new_payload: Option<Instant>,
}

#[derive(Clone, Copy, Debug)]
pub struct HeartbeatTimings {
    pub grace_period: Duration,
    pub poll_interval: Duration,
    /// Consensus updates older than this are considered missing.
    pub offline_timeout: Duration,
    pub warn_interval: Duration,
}

impl Default for HeartbeatTimings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            offline_timeout: Duration::from_secs(120),
            warn_interval: Duration::from_secs(300),
        }
    }
}

pub enum HeartbeatMessage {
    Stop,
}

#[derive(Default)]
struct Monitor {
    offline_logged_at: Option<Instant>,
}

impl Monitor {
    fn poll(
        &mut self,
        activity: ActivitySnapshot,
        now: Instant,
        timings: &HeartbeatTimings,
    ) -> Option<&'static str> {
        let recent = |instant: Option<Instant>| {
            instant.is_some_and(|instant| {
                now.saturating_duration_since(instant) <= timings.offline_timeout
            })
        };

        if recent(activity.last_forkchoice_update) || recent(activity.last_new_payload) {
            self.offline_logged_at = None;
            return None;
        }

        if self.offline_logged_at.is_some_and(|logged_at| {
            now.saturating_duration_since(logged_at) <= timings.warn_interval
        }) {
            return None;
        }

        self.offline_logged_at = Some(now);

        let warning = match activity {
            ActivitySnapshot {
                last_transition_update: None,
                last_forkchoice_update: None,
                last_new_payload: None,
            } => NO_BEACON_CLIENT,
            ActivitySnapshot {
                last_forkchoice_update: None,
                last_new_payload: None,
                ..
            } => NO_CONSENSUS_UPDATES,
            _ => STALE_CONSENSUS_UPDATES,
        };

        Some(warning)
    }
}

pub struct Heartbeat {
    config: Arc<Config>,
    activity: Arc<Activity>,
    timings: HeartbeatTimings,
    rx: UnboundedReceiver<HeartbeatMessage>,
}

impl Heartbeat {
    #[must_use]
    pub const fn new(
        config: Arc<Config>,
        activity: Arc<Activity>,
        timings: HeartbeatTimings,
        rx: UnboundedReceiver<HeartbeatMessage>,
    ) -> Self {
        Self {
            config,
            activity,
            timings,
            rx,
        }
    }

    pub async fn run(mut self) {
        // Rollup nodes are driven by their own consensus layer.
        if self.config.is_optimism() {
            return;
        }

        tokio::select! {
            () = tokio::time::sleep(self.timings.grace_period) => {}
            _ = self.rx.next() => return,
        }

        if self.config.terminal_total_difficulty.is_none() {
            return;
        }

        let mut monitor = Monitor::default();
        let mut interval = tokio::time::interval(self.timings.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let activity = self.activity.snapshot();

                    if let Some(warning) = monitor.poll(activity, Instant::now(), &self.timings) {
                        warn_with_head!("{warning}");
                    }
                }
                message = self.rx.next() => match message {
                    Some(HeartbeatMessage::Stop) | None => break,
                },
            }
        }
    }
}
