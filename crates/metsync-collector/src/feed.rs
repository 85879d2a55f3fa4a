//! JSON-lines sample feed.
//!
//! Reads one JSON-encoded [`Sample`] per line and enqueues it. Used to
//! bring VM-origin samples into the same buffer as scraped volumes.
//!
//! The feed blocks on its reader, so it runs on a dedicated thread
//! rather than inside the runtime: a read on stdin cannot be cancelled,
//! and a detached thread does not hold up runtime shutdown.

use std::io::BufRead;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use metsync_core::Sample;

/// Enqueue every decodable line from `reader` until EOF.
///
/// Blank lines are skipped, undecodable lines are logged and skipped.
/// Returns the number of samples enqueued; stops early if the buffer
/// closes. Must not be called from within an async context.
pub fn feed_json_lines<R: BufRead>(reader: R, tx: mpsc::Sender<Sample>) -> anyhow::Result<u64> {
    let mut fed = 0u64;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: Sample = match serde_json::from_str(line) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping undecodable sample");
                continue;
            }
        };
        if tx.blocking_send(sample).is_err() {
            debug!("sample buffer closed, feed stopping");
            break;
        }
        fed += 1;
    }

    Ok(fed)
}

/// Run [`feed_json_lines`] on a named background thread.
pub fn spawn_feed<R>(name: &str, reader: R, tx: mpsc::Sender<Sample>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    let feed = name.to_string();
    std::thread::Builder::new()
        .name(format!("metsync-feed-{name}"))
        .spawn(move || match feed_json_lines(reader, tx) {
            Ok(fed) => info!(%feed, samples = fed, "feed finished"),
            Err(e) => warn!(%feed, error = %e, "feed failed"),
        })
}

/// Decode a whole JSON-lines document synchronously.
///
/// Returns decoded samples and the number of skipped lines.
pub fn decode_json_lines(input: &str) -> (Vec<Sample>, usize) {
    let mut samples = Vec::new();
    let mut skipped = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping undecodable sample");
                skipped += 1;
            }
        }
    }
    (samples, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metsync_core::TAG_VM;

    const INPUT: &str = r#"{"timestamp":"2024-05-01T10:00:00Z","fields":["cpu"],"values":[0.5],"tags":{"vm":"vm1","volumes":"v1|v2"}}

not json
{"timestamp":"2024-05-01T10:00:10Z","fields":["cpu","mem"],"values":[0.5],"tags":{"vm":"vm1"}}
{"timestamp":"2024-05-01T10:00:20Z","tags":{"vm":"vm2","volumes":"v3"}}
"#;

    #[test]
    fn feed_skips_bad_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let fed = feed_json_lines(INPUT.as_bytes(), tx).unwrap();
        assert_eq!(fed, 2);

        let first = rx.blocking_recv().unwrap();
        assert_eq!(first.tag(TAG_VM), Some("vm1"));
        assert_eq!(first.volume_ids(), vec!["v1", "v2"]);
        let second = rx.blocking_recv().unwrap();
        assert_eq!(second.tag(TAG_VM), Some("vm2"));
        assert!(second.is_empty());
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn feed_stops_when_buffer_closes() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(feed_json_lines(INPUT.as_bytes(), tx).unwrap(), 0);
    }

    #[tokio::test]
    async fn spawned_feed_reaches_async_receiver() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = spawn_feed("test", INPUT.as_bytes(), tx).unwrap();

        assert_eq!(rx.recv().await.unwrap().tag(TAG_VM), Some("vm1"));
        assert_eq!(rx.recv().await.unwrap().tag(TAG_VM), Some("vm2"));
        assert!(rx.recv().await.is_none());
        handle.join().unwrap();
    }

    #[test]
    fn decode_counts_skipped_lines() {
        let (samples, skipped) = decode_json_lines(INPUT);
        assert_eq!(samples.len(), 2);
        assert_eq!(skipped, 2);
    }
}
