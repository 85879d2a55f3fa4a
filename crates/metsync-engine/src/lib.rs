//! metsync-engine — correlates Ceph volume samples with VM samples.
//!
//! Volume-origin samples carry an `image` tag; VM-origin samples carry a
//! `vm` tag and a pipe-delimited `volumes` tag. The engine keeps the
//! latest sample per key and, on every arrival, tries to build one
//! composite per VM that embeds its volumes' metrics under
//! `ceph/<volume>/`.
//!
//! # Architecture
//!
//! ```text
//! SyncEngine::process(sample)
//!   ├── Sample::origin()       → volume / vm / dropped
//!   ├── VolumeCache / VmCache  ← owned copy, last write wins
//!   ├── merge::compose()       → composite or MergeFailure
//!   └── SampleSink::accept()   ← composite (or partial, per FailurePolicy)
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod merge;
pub mod sink;

pub use cache::{VmCache, VolumeCache};
pub use engine::{EngineStats, Outcome, SyncEngine};
pub use error::{CorrelationError, EngineError, MergeFailure};
pub use sink::{JsonLinesSink, SampleSink, SinkError, VecSink};
