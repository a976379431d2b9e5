//! Sync scheduler.
//!
//! Runs one fetch→normalize→commit cycle as soon as the engine starts and
//! another on every interval tick after that, until stopped. Both feeds are
//! requested concurrently and normalized only once both have answered.
//!
//! A single-flight guard (on by default) skips a tick while the previous
//! cycle is still outstanding. With the guard off, slow cycles may overlap
//! and whichever commits last wins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::store::{CancelSource, CancelToken, StateStore, SyncView};
use crate::fetch::{HttpSource, ResilientFetcher, RetryPolicy};
use crate::transform;
use crate::types::{FilterPatch, FilterSettings, SyncError, SyncSnapshot};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_RISKS_URL: &str = "https://api.coinchart.fun/dex_risks";
pub const DEFAULT_SIGNALS_URL: &str = "https://api.coinchart.fun/dex_signals";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Shortest period the scheduler accepts; `tokio::time::interval` rejects zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub risks_url: String,
    pub signals_url: String,
    pub interval: Duration,
    pub single_flight: bool,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risks_url: DEFAULT_RISKS_URL.to_string(),
            signals_url: DEFAULT_SIGNALS_URL.to_string(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            single_flight: true,
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New risks and signals are published.
    Committed,
    /// The error field is set; previous data is kept.
    Failed,
    /// The engine stopped before the cycle finished; nothing was written.
    Discarded,
    /// Another cycle was still running, so this one never started.
    Skipped,
}

/// Clears the in-flight flag when the cycle holding it ends.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { flag: flag.clone() })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Everything a single cycle needs; cloned into each spawned cycle task.
#[derive(Clone)]
struct CycleRunner {
    fetcher: ResilientFetcher,
    risks_url: Arc<str>,
    signals_url: Arc<str>,
    store: Arc<StateStore>,
    in_flight: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
}

impl CycleRunner {
    async fn run(&self, token: &CancelToken) -> CycleOutcome {
        let cycle = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        debug!(cycle, "Starting sync cycle");

        let (risks, signals) = tokio::join!(
            self.fetcher.fetch(&self.risks_url),
            self.fetcher.fetch(&self.signals_url),
        );

        if token.is_cancelled() {
            debug!(cycle, "Engine stopped mid-cycle, discarding result");
            return CycleOutcome::Discarded;
        }

        let result = match (risks, signals) {
            (Ok(risks_text), Ok(signals_text)) => transform::normalize(&risks_text, &signals_text),
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok((risks, signals)) => {
                info!(
                    cycle,
                    risks = risks.len(),
                    signals = signals.len(),
                    elapsed_ms,
                    "Sync cycle committed"
                );
                CycleOutcome::Committed
            }
            Err(e) => {
                error!(cycle, error = %e, elapsed_ms, "Sync cycle failed, keeping previous data");
                CycleOutcome::Failed
            }
        };

        if !self.store.commit(token, result) {
            debug!(cycle, "Engine stopped before commit, discarding result");
            return CycleOutcome::Discarded;
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The sync engine before it is started.
///
/// Construct one per process, hand [`SyncEngine::view`]s to consumers,
/// then call [`SyncEngine::start`].
pub struct SyncEngine {
    runner: CycleRunner,
    interval: Duration,
    single_flight: bool,
    cancel: CancelSource,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, source: Arc<dyn HttpSource>) -> Self {
        let cancel = CancelSource::new();
        let store = Arc::new(StateStore::new(cancel.token()));

        if config.interval < MIN_INTERVAL {
            warn!(
                interval_ms = config.interval.as_millis() as u64,
                "Sync interval too short, clamping to {}ms",
                MIN_INTERVAL.as_millis()
            );
        }

        Self {
            runner: CycleRunner {
                fetcher: ResilientFetcher::new(source, config.retry),
                risks_url: Arc::from(config.risks_url),
                signals_url: Arc::from(config.signals_url),
                store,
                in_flight: Arc::new(AtomicBool::new(false)),
                sequence: Arc::new(AtomicU64::new(0)),
            },
            interval: config.interval.max(MIN_INTERVAL),
            single_flight: config.single_flight,
            cancel,
        }
    }

    pub fn view(&self) -> SyncView {
        SyncView::new(self.runner.store.clone())
    }

    /// Run one cycle right now, outside the schedule.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = match FlightGuard::acquire(&self.runner.in_flight) {
            Some(guard) => guard,
            None => return CycleOutcome::Skipped,
        };
        self.runner.run(&self.cancel.token()).await
    }

    /// Spawn the polling loop. The first cycle starts immediately.
    pub fn start(mut self) -> EngineHandle {
        let view = self.view();
        let cancel = std::mem::take(&mut self.cancel);
        let token = cancel.token();

        info!(
            risks_url = %self.runner.risks_url,
            signals_url = %self.runner.signals_url,
            interval_secs = self.interval.as_secs(),
            single_flight = self.single_flight,
            "Sync engine starting"
        );

        let task = tokio::spawn(poll_loop(
            self.runner.clone(),
            self.interval,
            self.single_flight,
            token,
        ));

        EngineHandle {
            view,
            cancel,
            task: Some(task),
        }
    }
}

/// An engine dropped before `start` closes its views.
impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    runner: CycleRunner,
    interval: Duration,
    single_flight: bool,
    mut token: CancelToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Sync scheduler stopped");
                break;
            }
            _ = ticker.tick() => {
                let guard = if single_flight {
                    match FlightGuard::acquire(&runner.in_flight) {
                        Some(guard) => Some(guard),
                        None => {
                            warn!("Previous sync cycle still running, skipping tick");
                            continue;
                        }
                    }
                } else {
                    None
                };

                let runner = runner.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    runner.run(&token).await
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running engine. Dropping it stops the schedule like [`EngineHandle::stop`]
/// without waiting for the loop to exit.
pub struct EngineHandle {
    view: SyncView,
    cancel: CancelSource,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn view(&self) -> SyncView {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.view.snapshot()
    }

    pub fn update_filters(&self, patch: FilterPatch) -> Result<FilterSettings, SyncError> {
        self.view.update_filters(patch)
    }

    /// Stop the timer and invalidate the token.
    ///
    /// Requests already in flight are left to finish; their results are
    /// dropped. Every view handed out fails with `SyncError::Scope` afterwards.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync scheduler task ended abnormally");
            }
        }
        info!("Sync engine stopped");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
