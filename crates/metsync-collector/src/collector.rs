//! Collection loop and forwarding task.
//!
//! The [`Collector`] scrapes the Ceph endpoint on a fixed interval and
//! pushes parsed volume samples into a bounded channel. A single
//! [`Forwarder`] drains that channel into the [`SyncEngine`], so every
//! producer sharing the channel is serialized in front of the engine.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use metsync_core::{CollectorConfig, Sample};
use metsync_engine::{SampleSink, SyncEngine};

use crate::parse::CephParser;
use crate::scrape::{ScrapeError, Scraper};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("sample buffer closed")]
    Closed,
}

/// Bounded buffer between producers and the forwarder.
pub fn sample_channel(capacity: usize) -> (mpsc::Sender<Sample>, mpsc::Receiver<Sample>) {
    mpsc::channel(capacity.max(1))
}

/// Periodically scrapes Ceph RBD metrics.
pub struct Collector {
    scraper: Scraper,
    parser: CephParser,
    loop_wait: Duration,
}

impl Collector {
    pub fn new(config: &CollectorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            scraper: Scraper::new(&config.endpoint, config.request_timeout()?)?,
            parser: CephParser::new(config.source_name.clone())?,
            loop_wait: config.loop_wait()?,
        })
    }

    /// Scrape once and enqueue every parsed sample.
    ///
    /// Returns the number of samples enqueued.
    pub async fn collect_once(&self, tx: &mpsc::Sender<Sample>) -> Result<usize, CollectError> {
        let body = self.scraper.fetch().await?;
        let samples = self.parser.parse(&body, Utc::now());
        let count = samples.len();
        for sample in samples {
            tx.send(sample).await.map_err(|_| CollectError::Closed)?;
        }
        Ok(count)
    }

    /// Run the scrape loop until shutdown or until the buffer closes.
    ///
    /// A failed scrape is logged and retried on the next tick.
    pub async fn run(&self, tx: mpsc::Sender<Sample>, mut shutdown: watch::Receiver<bool>) {
        info!(
            endpoint = %self.scraper.endpoint(),
            interval_ms = self.loop_wait.as_millis() as u64,
            "ceph collector started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.collect_once(&tx).await {
                Ok(count) => debug!(samples = count, "scrape enqueued"),
                Err(CollectError::Closed) => {
                    info!("sample buffer closed, collector stopping");
                    break;
                }
                Err(e) => warn!(error = %e, "ceph scrape failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.loop_wait) => {}
                _ = shutdown.changed() => {
                    info!("ceph collector shutting down");
                    break;
                }
            }
        }
    }
}

/// Drains the sample buffer into the engine.
pub struct Forwarder<S> {
    engine: SyncEngine<S>,
    fatal_forwarding_error: bool,
}

impl<S: SampleSink> Forwarder<S> {
    pub fn new(engine: SyncEngine<S>, fatal_forwarding_error: bool) -> Self {
        Self {
            engine,
            fatal_forwarding_error,
        }
    }

    /// Process samples until shutdown or until every producer is gone.
    ///
    /// On shutdown, samples already buffered are still processed. A sink
    /// failure is logged, or, with `fatal_forwarding_error`, signals
    /// shutdown through `shutdown_tx` and ends the run with the error.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Sample>,
        shutdown_tx: watch::Sender<bool>,
    ) -> anyhow::Result<SyncEngine<S>> {
        let mut shutdown = shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                sample = rx.recv() => match sample {
                    Some(sample) => self.handle(sample, &shutdown_tx)?,
                    None => {
                        debug!("all sample producers closed");
                        return Ok(self.engine);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        while let Ok(sample) = rx.try_recv() {
            self.handle(sample, &shutdown_tx)?;
        }
        let stats = self.engine.stats();
        info!(
            processed = stats.processed,
            emitted = stats.emitted,
            failed = stats.failed,
            dropped = stats.dropped,
            "forwarder stopped"
        );
        Ok(self.engine)
    }

    fn handle(&mut self, sample: Sample, shutdown_tx: &watch::Sender<bool>) -> anyhow::Result<()> {
        if let Err(e) = self.engine.process(sample) {
            if self.fatal_forwarding_error {
                error!(error = %e, "fatal forwarding error, shutting down");
                let _ = shutdown_tx.send(true);
                return Err(e.into());
            }
            error!(error = %e, "failed to forward sample");
        }
        Ok(())
    }
}
