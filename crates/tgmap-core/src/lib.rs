//! Core reconciliation logic for rendering chat location reports as map markers.
//!
//! This crate is intentionally framework-agnostic. The chat transport, the
//! rendering host and platform image grants live behind ports (traits)
//! implemented in adapter crates.

pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod freshness;
pub mod images;
pub mod logging;
pub mod reconciler;
pub mod report;
pub mod settings;
pub mod surface;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
