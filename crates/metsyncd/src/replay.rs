//! Replay mode — runs a recorded JSON-lines sample file through the
//! engine synchronously.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context;
use tracing::info;

use metsync_collector::decode_json_lines;
use metsync_core::{EngineConfig, MetsyncConfig};
use metsync_engine::{EngineStats, JsonLinesSink, Outcome, SyncEngine};

pub fn replay_file(config: &MetsyncConfig, input: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let content = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?
    };

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let stats = replay(&config.engine, &content, writer)?;
    info!(
        processed = stats.processed,
        emitted = stats.emitted,
        failed = stats.failed,
        dropped = stats.dropped,
        skipped = stats.skipped,
        "replay finished"
    );
    Ok(())
}

/// Process every decodable sample of `input`, writing composites to `out`.
pub fn replay<W: Write>(config: &EngineConfig, input: &str, out: W) -> anyhow::Result<EngineStats> {
    let (samples, undecodable) = decode_json_lines(input);
    if undecodable > 0 {
        info!(lines = undecodable, "undecodable lines skipped");
    }

    let mut engine = SyncEngine::new(config.clone(), JsonLinesSink::new(out));
    for sample in samples {
        if let Outcome::Failed { error, .. } = engine.process(sample)? {
            tracing::debug!(%error, "replayed sample not correlated");
        }
    }
    Ok(engine.stats())
}
