//! The synchronization engine.
//!
//! Each inbound sample is classified, cached, and used to trigger one
//! merge attempt. The outcome is handed to the sink according to the
//! configured [`FailurePolicy`].

use tracing::{debug, info};

use metsync_core::{EngineConfig, FailurePolicy, Origin, Sample};

use crate::cache::{VmCache, VolumeCache};
use crate::error::{CorrelationError, EngineError, MergeFailure};
use crate::merge::compose;
use crate::sink::SampleSink;

/// What happened to one inbound sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A complete composite was forwarded.
    Emitted,
    /// The sample matched neither stream shape.
    Dropped,
    /// A volume sample repeated the cached timestamp and was ignored.
    /// Under [`FailurePolicy::ForwardPartial`] an empty record is still
    /// forwarded.
    Skipped,
    /// The merge attempt failed; `forwarded` tells whether the partial
    /// record still went to the sink.
    Failed {
        error: CorrelationError,
        forwarded: bool,
    },
}

/// Running counters, reset only with the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub processed: u64,
    pub emitted: u64,
    pub failed: u64,
    pub dropped: u64,
    pub skipped: u64,
}

/// Correlates volume-origin and VM-origin samples into composites.
///
/// Not internally synchronized: callers with several producers must
/// funnel samples through a single owner.
pub struct SyncEngine<S> {
    config: EngineConfig,
    volumes: VolumeCache,
    vms: VmCache,
    sink: S,
    stats: EngineStats,
}

impl<S: SampleSink> SyncEngine<S> {
    pub fn new(config: EngineConfig, sink: S) -> Self {
        let volumes = VolumeCache::new().with_capacity_limit(config.max_volumes);
        let vms = VmCache::new().with_capacity_limit(config.max_vms);
        Self {
            config,
            volumes,
            vms,
            sink,
            stats: EngineStats::default(),
        }
    }

    /// Process one inbound sample.
    ///
    /// Correlation failures are reported in the returned [`Outcome`];
    /// only a sink failure is an error.
    pub fn process(&mut self, sample: Sample) -> Result<Outcome, EngineError> {
        if log_due(self.stats.processed, self.config.print_every) {
            info!(
                processed = self.stats.processed,
                emitted = self.stats.emitted,
                failed = self.stats.failed,
                volumes = self.volumes.len(),
                vms = self.vms.len(),
                "synchronizing sample"
            );
        }
        self.stats.processed += 1;

        match self.correlate(sample) {
            Attempt::Dropped => {
                self.stats.dropped += 1;
                Ok(Outcome::Dropped)
            }
            Attempt::Skipped => {
                self.stats.skipped += 1;
                if self.config.failure_policy == FailurePolicy::ForwardPartial {
                    self.forward(Sample::empty())?;
                }
                Ok(Outcome::Skipped)
            }
            Attempt::Composite(composite) => {
                self.forward(composite)?;
                self.stats.emitted += 1;
                Ok(Outcome::Emitted)
            }
            Attempt::Failed(MergeFailure { error, partial }) => {
                self.stats.failed += 1;
                debug!(%error, "correlation attempt failed");
                let forwarded = match self.config.failure_policy {
                    FailurePolicy::Suppress => false,
                    FailurePolicy::ForwardPartial => {
                        self.forward(partial)?;
                        true
                    }
                };
                Ok(Outcome::Failed { error, forwarded })
            }
        }
    }

    /// Classify, cache and attempt one merge.
    fn correlate(&mut self, sample: Sample) -> Attempt {
        let key = match sample.origin() {
            Some(Origin::Volume { image }) => Key::Volume(image.to_string()),
            Some(Origin::Vm { vm }) => Key::Vm(vm.to_string()),
            None => {
                debug!(tags = ?sample.tags(), "dropping unclassifiable sample");
                return Attempt::Dropped;
            }
        };

        match key {
            Key::Volume(image) => {
                if self.config.skip_duplicate_volume_timestamps
                    && self
                        .volumes
                        .get(&image)
                        .is_some_and(|cached| cached.timestamp() == sample.timestamp())
                {
                    debug!(%image, "volume sample repeats cached timestamp");
                    return Attempt::Skipped;
                }
                if let Err(error) = self.volumes.insert(&image, sample) {
                    return Attempt::Failed(MergeFailure::empty(error));
                }
                self.attempt(&image)
            }
            Key::Vm(vm) => {
                // `volume_ids` always yields at least one entry.
                let probe = sample.volume_ids()[0].to_string();
                if let Err(error) = self.vms.insert(&vm, sample) {
                    return Attempt::Failed(MergeFailure::empty(error));
                }
                self.attempt(&probe)
            }
        }
    }

    fn attempt(&self, probe: &str) -> Attempt {
        match compose(&self.vms, &self.volumes, probe) {
            Ok(composite) => {
                debug!(
                    %probe,
                    vm = composite.tag(metsync_core::TAG_VM).unwrap_or_default(),
                    fields = composite.len(),
                    "composite built"
                );
                Attempt::Composite(composite)
            }
            Err(failure) => Attempt::Failed(failure),
        }
    }

    fn forward(&mut self, sample: Sample) -> Result<(), EngineError> {
        let values = sample.values().len();
        self.sink
            .accept(sample)
            .map_err(|source| EngineError::Sink { values, source })
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn volumes(&self) -> &VolumeCache {
        &self.volumes
    }

    pub fn vms(&self) -> &VmCache {
        &self.vms
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Whether the record about to be processed gets the periodic info line.
fn log_due(processed: u64, every: u64) -> bool {
    every > 0 && processed % every == 0
}

enum Key {
    Volume(String),
    Vm(String),
}

enum Attempt {
    Composite(Sample),
    Failed(MergeFailure),
    Dropped,
    Skipped,
}
