//! Long-running mode.
//!
//! Wires the pipeline:
//! 1. Ceph collector scraping into the shared sample buffer
//! 2. Optional stdin feed of VM samples into the same buffer
//! 3. A single forwarder owning the engine, writing composites to stdout
//!
//! Ctrl-C, or a fatal forwarding error, shuts everything down.

use std::future::Future;
use std::io::{BufRead, BufReader, Write};

use tokio::sync::watch;
use tracing::{info, warn};

use metsync_collector::{sample_channel, spawn_feed, Collector, Forwarder};
use metsync_core::MetsyncConfig;
use metsync_engine::{EngineStats, JsonLinesSink, SyncEngine};

pub async fn run(config: MetsyncConfig, stdin_feed: bool) -> anyhow::Result<()> {
    let feed = stdin_feed.then(|| BufReader::new(std::io::stdin()));
    let signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    };
    run_pipeline(config, feed, std::io::stdout(), signal).await?;
    Ok(())
}

/// Run the pipeline until `shutdown` resolves or forwarding fails fatally.
///
/// The feed thread is left detached on return; it ends on its own once
/// its reader hits EOF or the buffer is gone.
pub async fn run_pipeline<R, W, F>(
    config: MetsyncConfig,
    feed: Option<R>,
    out: W,
    shutdown: F,
) -> anyhow::Result<EngineStats>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        endpoint = %config.collector.endpoint,
        failure_policy = ?config.engine.failure_policy,
        "metsync daemon starting"
    );

    let collector = Collector::new(&config.collector)?;
    let (tx, rx) = sample_channel(config.collector.buffered_samples);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Forwarder ──────────────────────────────────────────────

    let engine = SyncEngine::new(config.engine.clone(), JsonLinesSink::new(out));
    let forwarder = tokio::spawn(
        Forwarder::new(engine, config.collector.fatal_forwarding_error)
            .run(rx, shutdown_tx.clone()),
    );

    // ── Producers ──────────────────────────────────────────────

    let collector_handle = {
        let tx = tx.clone();
        tokio::spawn(async move { collector.run(tx, shutdown_rx).await })
    };

    if let Some(reader) = feed {
        spawn_feed("stdin", reader, tx)?;
    } else {
        drop(tx);
    }

    // ── Shutdown signal ────────────────────────────────────────

    let signal_tx = shutdown_tx.clone();
    let signal = tokio::spawn(async move {
        shutdown.await;
        let _ = signal_tx.send(true);
    });

    let result = forwarder.await?;

    let _ = shutdown_tx.send(true);
    signal.abort();
    let _ = collector_handle.await;

    let engine = result?;
    let stats = engine.stats();
    info!(
        processed = stats.processed,
        emitted = stats.emitted,
        written = engine.sink().written(),
        "metsync daemon stopped"
    );
    Ok(stats)
}
