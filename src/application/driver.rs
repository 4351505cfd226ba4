//! The periodic trigger that keeps new payments flowing.
//!
//! One ticker task per running driver. Each tick spawns an independent
//! lifecycle run and returns straight away, so a slow run never delays the
//! next tick. Stopping aborts the ticker only; runs already in flight finish.

use crate::application::lifecycle::LifecycleSimulator;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorStatus {
    pub running: bool,
    pub interval_ms: u64,
}

struct SimulatorState {
    interval: Duration,
    /// `Some` while running.
    ticker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Held by a lifecycle run for as long as it is in flight.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct SimulatorDriver {
    lifecycle: Arc<LifecycleSimulator>,
    default_interval: Duration,
    state: Mutex<SimulatorState>,
    in_flight: Arc<InFlight>,
}

impl SimulatorDriver {
    /// A stopped driver. Its interval starts at the lifecycle config's default.
    pub fn new(lifecycle: Arc<LifecycleSimulator>) -> Self {
        let default_interval = lifecycle.config().default_interval().max(MIN_INTERVAL);
        Self {
            lifecycle,
            default_interval,
            state: Mutex::new(SimulatorState {
                interval: default_interval,
                ticker: None,
            }),
            in_flight: Arc::default(),
        }
    }

    /// Starts ticking every `interval` (or the default). Already running:
    /// nothing changes, including the interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Option<Duration>) -> SimulatorStatus {
        let mut state = self.lock();
        if state.ticker.is_some() {
            return status_of(&state);
        }

        let interval = interval.unwrap_or(self.default_interval).max(MIN_INTERVAL);
        state.interval = interval;
        state.ticker = Some(tokio::spawn(tick_loop(
            self.lifecycle.clone(),
            self.in_flight.clone(),
            interval,
        )));
        tracing::info!(interval_ms = interval.as_millis() as u64, "simulator started");
        status_of(&state)
    }

    /// Stops future ticks. Not running: nothing changes.
    pub fn stop(&self) -> SimulatorStatus {
        let mut state = self.lock();
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
            tracing::info!(in_flight = self.in_flight(), "simulator stopped");
        }
        status_of(&state)
    }

    pub fn status(&self) -> SimulatorStatus {
        status_of(&self.lock())
    }

    /// Number of lifecycle runs that have not reached their final status yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Waits until no lifecycle run is in flight.
    pub async fn drain(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SimulatorDriver {
    fn drop(&mut self) {
        if let Some(ticker) = self.lock().ticker.take() {
            ticker.abort();
        }
    }
}

fn status_of(state: &SimulatorState) -> SimulatorStatus {
    SimulatorStatus {
        running: state.ticker.is_some(),
        interval_ms: state.interval.as_millis() as u64,
    }
}

async fn tick_loop(lifecycle: Arc<LifecycleSimulator>, in_flight: Arc<InFlight>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let guard = InFlightGuard::enter(&in_flight);
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = lifecycle.run_lifecycle().await {
                tracing::warn!("lifecycle run aborted: {}", e);
            }
        });
    }
}
