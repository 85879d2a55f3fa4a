//! metsync-collector — feeds the synchronization engine.
//!
//! Scrapes the Ceph mgr prometheus endpoint, parses per-image RBD
//! metrics into volume samples, and forwards everything buffered to a
//! single engine owner.
//!
//! # Architecture
//!
//! ```text
//! Collector::run()            ── scrape → parse ──┐
//! feed::spawn_feed() (thread) ── VM samples ──────┤ mpsc (buffered_samples)
//!                                                 ▼
//! Forwarder::run()            → SyncEngine::process() → SampleSink
//! ```

pub mod collector;
pub mod feed;
pub mod parse;
pub mod scrape;

pub use collector::{sample_channel, CollectError, Collector, Forwarder};
pub use feed::{decode_json_lines, feed_json_lines, spawn_feed};
pub use parse::CephParser;
pub use scrape::{ScrapeError, Scraper};
