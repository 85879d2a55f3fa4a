//! Ceph RBD metrics parser.
//!
//! Turns the Prometheus text exposition of the Ceph mgr module into one
//! volume-origin [`Sample`] per RBD image.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, trace};

use metsync_core::{Sample, TAG_IMAGE, TAG_NAMESPACE, TAG_POOL, TAG_SOURCE_NAME};

/// Per-image RBD metric families picked up from the exposition.
pub const RBD_METRICS: &[&str] = &[
    "ceph_rbd_read_ops",
    "ceph_rbd_write_ops",
    "ceph_rbd_read_bytes",
    "ceph_rbd_write_bytes",
    "ceph_rbd_read_latency_count",
    "ceph_rbd_read_latency_sum",
    "ceph_rbd_write_latency_count",
    "ceph_rbd_write_latency_sum",
];

pub struct CephParser {
    line_re: Regex,
    label_re: Regex,
    source_name: String,
}

impl CephParser {
    pub fn new(source_name: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            line_re: Regex::new(r"^([A-Za-z_:][A-Za-z0-9_:]*)\{([^}]*)\}\s+(\S+)")?,
            label_re: Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)="((?:[^"\\]|\\.)*)""#)?,
            source_name: source_name.into(),
        })
    }

    /// Parse one scrape body taken at `scraped_at`.
    ///
    /// Samples come out in the order their image first appears; fields
    /// keep the order of their lines.
    pub fn parse(&self, body: &str, scraped_at: DateTime<Utc>) -> Vec<Sample> {
        let mut samples: Vec<Sample> = Vec::new();
        let mut by_image: HashMap<String, usize> = HashMap::new();

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(caps) = self.line_re.captures(line) else {
                continue;
            };
            let metric = &caps[1];
            if !RBD_METRICS.contains(&metric) {
                continue;
            }

            let labels = self.labels(&caps[2]);
            let Some(image) = labels.get(TAG_IMAGE).filter(|image| !image.is_empty()) else {
                debug!(%metric, "rbd metric without image label");
                continue;
            };
            let value = match caps[3].parse::<f64>() {
                Ok(value) => value,
                Err(e) => {
                    debug!(%metric, %image, raw = &caps[3], error = %e, "unparsable metric value");
                    continue;
                }
            };

            let index = *by_image.entry(image.clone()).or_insert_with(|| {
                samples.push(
                    Sample::at(scraped_at)
                        .with_tag(TAG_IMAGE, image.as_str())
                        .with_tag(TAG_POOL, label_or_empty(&labels, TAG_POOL))
                        .with_tag(TAG_NAMESPACE, label_or_empty(&labels, TAG_NAMESPACE))
                        .with_tag(TAG_SOURCE_NAME, self.source_name.as_str()),
                );
                samples.len() - 1
            });
            samples[index].push_field(metric, value);
        }

        trace!(images = samples.len(), "parsed rbd metrics");
        samples
    }

    fn labels(&self, raw: &str) -> HashMap<String, String> {
        self.label_re
            .captures_iter(raw)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    }
}

fn label_or_empty<'a>(labels: &'a HashMap<String, String>, key: &str) -> &'a str {
    labels.get(key).map(String::as_str).unwrap_or_default()
}
