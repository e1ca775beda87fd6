//! Rendering-host abstractions (map layers and points).

pub mod port;
pub mod types;
