//! Snapshot store and cancellation token.
//!
//! The store owns the single [`SyncSnapshot`] and publishes every change
//! over a `tokio::sync::watch` channel. Cycle commits and filter updates
//! are the only writers. Once the engine's token is cancelled the store is
//! closed: further commits are dropped and consumer access fails with
//! `SyncError::Scope`.

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::filter::derive_filtered;
use crate::types::{
    FilterPatch, FilterSettings, RiskRecord, SignalRecord, SyncError, SyncSnapshot,
};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Owner side of a cancellation token. Cancelling is permanent.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Observer side, handed to every cycle and checked before each commit.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the token is cancelled (or its source is gone).
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Holder of the published snapshot.
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<SyncSnapshot>,
    token: CancelToken,
}

impl StateStore {
    /// A fresh store in the loading state, open until `token` is cancelled.
    pub fn new(token: CancelToken) -> Self {
        let (tx, _rx) = watch::channel(SyncSnapshot::initial());
        Self { tx, token }
    }

    pub fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SyncError::Scope)
        }
    }

    pub fn snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.ensure_open()?;
        Ok(self.tx.borrow().clone())
    }

    pub fn subscribe(&self) -> Result<watch::Receiver<SyncSnapshot>, SyncError> {
        self.ensure_open()?;
        Ok(self.tx.subscribe())
    }

    pub fn filters(&self) -> Result<FilterSettings, SyncError> {
        self.ensure_open()?;
        Ok(self.tx.borrow().filters)
    }

    /// Merge `patch` into the current settings and re-derive the filtered set.
    ///
    /// Subscribers are only notified when the merged settings differ from
    /// the current ones. Returns the settings now in effect.
    pub fn update_filters(&self, patch: &FilterPatch) -> Result<FilterSettings, SyncError> {
        let mut outcome = Err(SyncError::Scope);

        self.tx.send_if_modified(|snap| {
            if self.token.is_cancelled() {
                return false;
            }

            let next = snap.filters.merge(patch);
            outcome = Ok(next);
            if next == snap.filters {
                return false;
            }

            snap.filters = next;
            snap.filtered_data = derive_filtered(&snap.data, &next);
            debug!(
                filters = ?next,
                kept = snap.filtered_data.len(),
                total = snap.data.len(),
                "Filters updated"
            );
            true
        });

        outcome
    }

    /// Apply the result of one cycle.
    ///
    /// Success replaces risks and signals together and clears the error;
    /// failure records the error and leaves the last good data in place.
    /// Either way `loading` ends. Nothing is written, and `false` returned,
    /// if `token` or the store itself has been cancelled.
    pub(crate) fn commit(
        &self,
        token: &CancelToken,
        result: Result<(Vec<RiskRecord>, Vec<SignalRecord>), SyncError>,
    ) -> bool {
        self.tx.send_if_modified(|snap| {
            if token.is_cancelled() || self.token.is_cancelled() {
                return false;
            }

            match result {
                Ok((risks, signals)) => {
                    snap.filtered_data = derive_filtered(&risks, &snap.filters);
                    snap.data = risks;
                    snap.signals = signals;
                    snap.error = None;
                    snap.last_updated = Some(Utc::now());
                }
                Err(e) => {
                    snap.error = Some(e.to_string());
                }
            }
            snap.loading = false;
            snap.cycles += 1;
            true
        })
    }
}

// ---------------------------------------------------------------------------
// Consumer view
// ---------------------------------------------------------------------------

/// Read-only handle to the engine state plus the filter mutator.
///
/// Cheap to clone; hand one to every consumer.
#[derive(Debug, Clone)]
pub struct SyncView {
    store: std::sync::Arc<StateStore>,
}

impl SyncView {
    pub fn new(store: std::sync::Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Whether the owning engine is still running.
    pub fn is_active(&self) -> bool {
        self.store.is_open()
    }

    pub fn snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> Result<watch::Receiver<SyncSnapshot>, SyncError> {
        self.store.subscribe()
    }

    pub fn filters(&self) -> Result<FilterSettings, SyncError> {
        self.store.filters()
    }

    pub fn update_filters(&self, patch: FilterPatch) -> Result<FilterSettings, SyncError> {
        self.store.update_filters(&patch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
