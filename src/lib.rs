//! Shared library modules for the arena worker.
//!
//! The worker binary wires these together; `arena-inspect` reuses the
//! config and ledger modules to read on-ledger state.

pub mod arena;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod ledger;
pub mod resolution;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod twitter;
