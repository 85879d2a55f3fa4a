//! Error types for the synchronization engine.

use thiserror::Error;

use metsync_core::Sample;

use crate::sink::SinkError;

/// Why a single correlation attempt did not produce a composite.
///
/// These are local to one attempt and never fatal for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("no owning VM known yet for volume {volume:?}")]
    NoOwningVm { volume: String },

    #[error("volume metrics unknown for {volume:?}")]
    VolumeMetricsUnknown { volume: String },

    #[error("cache capacity reached, refusing new key {key:?}")]
    CacheFull { key: String },
}

/// A failed merge attempt together with what it had built so far.
///
/// `partial` is the empty sample when no base VM was found, or the
/// composite as it stood when a volume lookup failed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeFailure {
    pub error: CorrelationError,
    pub partial: Sample,
}

impl MergeFailure {
    pub fn empty(error: CorrelationError) -> Self {
        Self {
            error,
            partial: Sample::empty(),
        }
    }
}

/// Errors surfaced to the caller of [`crate::SyncEngine::process`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to forward sample ({values} values): {source}")]
    Sink {
        values: usize,
        #[source]
        source: SinkError,
    },
}
