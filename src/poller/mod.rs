//! Fetch/retry state machine driving the pipeline on a fixed cadence.
//!
//! ```text
//! IDLE ─tick─▶ FETCHING ─ok─▶ PROCESS ─▶ IDLE
//!                 ▲   └─err─▶ BACKOFF ─┐
//!                 └────────────────────┘
//! ```
//!
//! One cycle runs to completion before the next tick is taken, and
//! [`Poller::run_cycle`] borrows the poller mutably, so two fetches can never
//! be in flight at once. Ticks missed while a cycle was stuck in backoff are
//! not replayed.

pub mod backoff;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::feed::AlertSource;
use crate::pipeline::{CycleOutcome, Pipeline};

pub use backoff::Backoff;

/// Consecutive transport failures between two `warn!` diagnostics.
pub const FAILURE_LOG_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Backoff,
    Process,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerCfg {
    pub poll_interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollerCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff: Backoff::default(),
        }
    }
}

pub struct Poller {
    source: Arc<dyn AlertSource>,
    pipeline: Pipeline,
    cfg: PollerCfg,
    state: PollState,
    retries: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Poller {
    pub fn new(source: Arc<dyn AlertSource>, pipeline: Pipeline, cfg: PollerCfg) -> Self {
        Self {
            source,
            pipeline,
            cfg,
            state: PollState::Idle,
            retries: 0,
            shutdown: None,
        }
    }

    /// Stop between cycles (or during a backoff wait) once `true` is sent.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Consecutive transport failures in the current outage.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    #[cfg(test)]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Poll until shutdown is requested. Never returns on its own otherwise.
    pub async fn run(&mut self) {
        info!(
            "Polling {} every {}ms",
            self.source.describe(),
            self.cfg.poll_interval.as_millis()
        );
        let mut ticker = interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                _ = ticker.tick() => {}
            }
            if self.run_cycle().await == CycleOutcome::Cancelled {
                break;
            }
        }
        info!("Poller stopped in {:?} state.", self.state);
    }

    /// One IDLE → … → IDLE pass. Retries the fetch until it succeeds or
    /// shutdown is requested.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = PollState::Fetching;
        let raw = loop {
            match self.source.fetch().await {
                Ok(raw) => {
                    if self.retries > 0 {
                        info!("Feed reachable again after {} failed attempt(s)", self.retries);
                    }
                    self.retries = 0;
                    break raw;
                }
                Err(e) => {
                    self.retries = self.retries.saturating_add(1);
                    let delay = self.cfg.backoff.delay(self.retries);
                    if escalate(self.retries) {
                        warn!(
                            "Feed unreachable for {} consecutive attempts: {e} (next retry in {}ms)",
                            self.retries,
                            delay.as_millis()
                        );
                    } else {
                        debug!("Fetch failed (attempt {}): {e}", self.retries);
                    }

                    self.state = PollState::Backoff;
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut self.shutdown) => {
                            self.state = PollState::Idle;
                            return CycleOutcome::Cancelled;
                        }
                        _ = sleep(delay) => {}
                    }
                    self.state = PollState::Fetching;
                }
            }
        };

        self.state = PollState::Process;
        let outcome = self.pipeline.process(&raw).await;
        self.state = PollState::Idle;
        outcome
    }
}

/// Whether the `retries`-th consecutive failure deserves a `warn!` rather
/// than a `debug!` line.
fn escalate(retries: u32) -> bool {
    retries > 0 && retries % FAILURE_LOG_EVERY == 0
}

/// Resolves once shutdown has been requested; pending forever without a
/// receiver or after the sender is gone.
async fn wait_for_shutdown(rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
