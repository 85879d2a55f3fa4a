//! metsync-core — shared types for the metsync workspace.
//!
//! Holds the [`Sample`] record exchanged between the collector, the
//! synchronization engine and sinks, plus the `metsync.toml` config.

pub mod config;
pub mod sample;

pub use config::{CollectorConfig, ConfigError, EngineConfig, FailurePolicy, MetsyncConfig};
pub use sample::*;
