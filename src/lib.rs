//! RISKPULSE: polling sync engine for DEX risk and signal feeds.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod fetch;
pub mod transform;
pub mod filter;
pub mod engine;
pub mod api;
