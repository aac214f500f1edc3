//! Adaptive collection scheduling.
//!
//! One logical worker loops: attempt a collection, compute the next wait
//! from the backoff rule, then sleep interruptibly. Kicks (manual
//! requests, frequency changes) and location triggers complete the sleep
//! early; stopping completes it and ends the loop.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::time;
use uuid::Uuid;

use crate::single_flight::SingleFlight;

/// Tunables for the collection loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between collections while they succeed.
    pub base_interval: Duration,
    /// Ceiling for the failure backoff.
    pub max_backoff: Duration,
    /// Movement below this distance does not trigger a collection.
    pub min_trigger_distance_m: f64,
    /// Inactivity gap after which a new session id is generated.
    pub session_gap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            max_backoff: Duration::from_secs(600),
            min_trigger_distance_m: 150.0,
            session_gap: Duration::from_secs(30 * 60),
        }
    }
}

/// Backoff rule for the wait after one collection attempt.
///
/// Success resets to the base interval; failure doubles the current one
/// up to `max`. A base above `max` disables backoff entirely — the base
/// is used unchanged regardless of outcome.
pub fn next_interval(current: Duration, base: Duration, max: Duration, success: bool) -> Duration {
    if base > max {
        return base;
    }
    if success { base } else { (current * 2).min(max) }
}

/// Mutable scheduling state, updated after every collection attempt.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub base_interval: Duration,
    pub current_interval: Duration,
    pub consecutive_failures: u32,
    pub last_collection: Option<DateTime<Utc>>,
    pub session_id: Option<Uuid>,
}

impl ScheduleState {
    fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            current_interval: base_interval,
            consecutive_failures: 0,
            last_collection: None,
            session_id: None,
        }
    }

    /// Session id for a collection starting at `now`: reused while the
    /// gap since the last collection stays within `gap`, regenerated
    /// beyond it. Groups logically related readings downstream.
    pub fn session_for(&mut self, now: DateTime<Utc>, gap: Duration) -> Uuid {
        let gap = chrono::Duration::from_std(gap).unwrap_or(chrono::Duration::MAX);
        match (self.session_id, self.last_collection) {
            (Some(id), Some(last)) if now.signed_duration_since(last) <= gap => id,
            _ => {
                let id = Uuid::now_v7();
                tracing::info!(session_id = %id, "starting new collection session");
                self.session_id = Some(id);
                id
            }
        }
    }

    fn record_outcome(&mut self, success: bool, now: DateTime<Utc>, max: Duration) {
        self.last_collection = Some(now);
        self.consecutive_failures = if success {
            0
        } else {
            self.consecutive_failures + 1
        };
        self.current_interval = next_interval(self.current_interval, self.base_interval, max, success);
    }
}

/// Background collection driver.
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    state: Mutex<ScheduleState>,
    kick: Notify,
    shutdown: watch::Sender<bool>,
    cycle_guard: SingleFlight<bool>,
    last_trigger_point: Mutex<Option<(f64, f64)>>,
}

impl AdaptiveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let state = ScheduleState::new(config.base_interval);
        Self {
            config,
            state: Mutex::new(state),
            kick: Notify::new(),
            shutdown,
            cycle_guard: SingleFlight::new(),
            last_trigger_point: Mutex::new(None),
        }
    }

    /// Complete the current sleep immediately. A kick while a cycle is
    /// running is remembered and skips the following sleep instead.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    /// Change the base collection interval and re-plan immediately.
    pub fn set_base_interval(&self, base: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            state.base_interval = base;
            state.current_interval = base;
        }
        tracing::info!(base_secs = base.as_secs(), "collection interval changed");
        self.kick();
    }

    /// Stop the loop: any pending sleep completes immediately and no
    /// further cycles start. In-flight work settles naturally.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn schedule_state(&self) -> ScheduleState {
        self.state.lock().unwrap().clone()
    }

    /// Feed a position fix. Movement beyond the configured minimum
    /// distance triggers an immediate collection, independent of the
    /// timer — this resumes collection quickly after returning to the
    /// vehicle without waiting out a long backoff.
    pub fn handle_location(&self, latitude: f64, longitude: f64) {
        let mut last = self.last_trigger_point.lock().unwrap();
        match *last {
            Some((lat, lon)) => {
                let distance = haversine_m(lat, lon, latitude, longitude);
                if distance < self.config.min_trigger_distance_m {
                    return;
                }
                *last = Some((latitude, longitude));
                drop(last);
                tracing::info!(distance_m = distance as u64, "location change, triggering collection");
                self.kick();
            }
            // First fix only seeds the reference point
            None => *last = Some((latitude, longitude)),
        }
    }

    /// Drive the collection loop until stopped.
    ///
    /// `collect` runs one cycle for the given session id and reports
    /// success. Cycles are single-flight guarded, so an external caller
    /// invoking the same closure cannot overlap the loop.
    pub async fn run<F, Fut>(&self, collect: F)
    where
        F: Fn(Uuid) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        tracing::info!(
            base_interval_secs = self.config.base_interval.as_secs(),
            "collection loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let session_id = {
                self.state
                    .lock()
                    .unwrap()
                    .session_for(Utc::now(), self.config.session_gap)
            };
            let success = self.cycle_guard.run(|| collect(session_id)).await;

            let wait = {
                let mut state = self.state.lock().unwrap();
                state.record_outcome(success, Utc::now(), self.config.max_backoff);
                if !success {
                    tracing::info!(
                        consecutive_failures = state.consecutive_failures,
                        next_attempt_secs = state.current_interval.as_secs(),
                        "collection failed, backing off"
                    );
                }
                state.current_interval
            };

            tokio::select! {
                _ = time::sleep(wait) => {}
                _ = self.kick.notified() => {
                    tracing::debug!("sleep interrupted by kick");
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("collection loop stopped");
    }
}

/// Great-circle distance in meters.
fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
