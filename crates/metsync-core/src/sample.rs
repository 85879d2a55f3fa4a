//! Sample records — the unit of data flowing through metsync.
//!
//! A [`Sample`] is a timestamped vector of named numeric fields plus a
//! string tag map. Field names and values are stored in parallel vectors
//! whose lengths are kept equal by every constructor and mutator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Volume identifier tag, set on volume-origin samples.
pub const TAG_IMAGE: &str = "image";
/// VM identifier tag, set on VM-origin samples.
pub const TAG_VM: &str = "vm";
/// Pipe-delimited list of volume identifiers owned by a VM.
pub const TAG_VOLUMES: &str = "volumes";
/// Name of the collector that produced the sample.
pub const TAG_SOURCE_NAME: &str = "sourceName";
pub const TAG_POOL: &str = "pool";
pub const TAG_NAMESPACE: &str = "namespace";

/// Separator between volume identifiers in the `volumes` tag.
pub const VOLUMES_DELIMITER: char = '|';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("field/value count mismatch: {fields} fields, {values} values")]
    LengthMismatch { fields: usize, values: usize },
}

/// The stream a sample belongs to, decided by its tag shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin<'a> {
    /// Per-volume block device metrics, keyed by `image`.
    Volume { image: &'a str },
    /// Per-VM metrics, keyed by `vm`, owning the volumes in `volumes`.
    Vm { vm: &'a str },
}

/// One timestamped measurement vector with string metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSample")]
pub struct Sample {
    timestamp: DateTime<Utc>,
    fields: Vec<String>,
    values: Vec<f64>,
    tags: HashMap<String, String>,
}

/// Unchecked wire shape; converted into [`Sample`] after the parity check.
#[derive(Deserialize)]
struct RawSample {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    values: Vec<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

impl TryFrom<RawSample> for Sample {
    type Error = SampleError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let mut sample = Sample::new(raw.timestamp, raw.fields, raw.values)?;
        sample.tags = raw.tags;
        Ok(sample)
    }
}

impl Sample {
    /// Build a sample from parallel field/value vectors.
    pub fn new(
        timestamp: DateTime<Utc>,
        fields: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, SampleError> {
        if fields.len() != values.len() {
            return Err(SampleError::LengthMismatch {
                fields: fields.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            timestamp,
            fields,
            values,
            tags: HashMap::new(),
        })
    }

    /// A sample with no fields, no tags and the epoch as timestamp.
    pub fn empty() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            fields: Vec::new(),
            values: Vec::new(),
            tags: HashMap::new(),
        }
    }

    /// A sample with no fields or tags, stamped `timestamp`.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..Self::empty()
        }
    }

    /// Builder-style tag setter.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_tag(key, value);
        self
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of field/value pairs.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append one field and its value.
    pub fn push_field(&mut self, name: impl Into<String>, value: f64) {
        self.fields.push(name.into());
        self.values.push(value);
    }

    /// Iterate `(field, value)` pairs in order.
    pub fn iter_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Look up a field value by name (first match).
    pub fn field(&self, name: &str) -> Option<f64> {
        self.iter_fields()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Classify the sample by its tag shape.
    ///
    /// `image` wins over `vm` when both are present. Returns `None` for
    /// samples that carry neither.
    pub fn origin(&self) -> Option<Origin<'_>> {
        if let Some(image) = self.tag(TAG_IMAGE) {
            Some(Origin::Volume { image })
        } else {
            self.tag(TAG_VM).map(|vm| Origin::Vm { vm })
        }
    }

    /// Volume identifiers listed in the `volumes` tag, left to right.
    ///
    /// An absent or empty tag yields a single empty identifier.
    pub fn volume_ids(&self) -> Vec<&str> {
        self.tag(TAG_VOLUMES)
            .unwrap_or("")
            .split(VOLUMES_DELIMITER)
            .collect()
    }
}
