//! Sync engine.
//!
//! - `store`: published snapshot, cancellation token, consumer view
//! - `poller`: schedule, cycles, engine lifecycle

pub mod poller;
pub mod store;

pub use poller::{CycleOutcome, EngineConfig, EngineHandle, SyncEngine};
pub use store::{CancelSource, CancelToken, StateStore, SyncView};
