//! metsync.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{key}`: {value:?}")]
    InvalidDuration { key: &'static str, value: String },

    #[error("invalid collector endpoint {0:?}: only http:// endpoints are supported")]
    InvalidEndpoint(String),

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetsyncConfig {
    pub engine: EngineConfig,
    pub collector: CollectorConfig,
}

/// What to emit when a correlation attempt fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Emit nothing for a failed attempt.
    #[default]
    Suppress,
    /// Forward whatever the attempt built (possibly empty).
    ForwardPartial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log every Nth processed record at info level; 0 disables.
    pub print_every: u64,
    pub failure_policy: FailurePolicy,
    /// Ignore volume records whose timestamp matches the cached one.
    pub skip_duplicate_volume_timestamps: bool,
    /// Refuse new volume keys once this many are cached.
    pub max_volumes: Option<usize>,
    /// Refuse new VM identities once this many are cached.
    pub max_vms: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            print_every: 100,
            failure_policy: FailurePolicy::Suppress,
            skip_duplicate_volume_timestamps: false,
            max_volumes: None,
            max_vms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Ceph mgr prometheus endpoint.
    pub endpoint: String,
    /// Value of the `sourceName` tag on scraped samples.
    pub source_name: String,
    /// Wait between two scrapes, e.g. "10s".
    pub loop_wait: String,
    pub request_timeout: String,
    /// Capacity of the buffer between scraping and forwarding.
    pub buffered_samples: usize,
    /// Stop the collector when forwarding a sample fails.
    pub fatal_forwarding_error: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9283/metrics".to_string(),
            source_name: "ceph".to_string(),
            loop_wait: "10s".to_string(),
            request_timeout: "5s".to_string(),
            buffered_samples: 100,
            fatal_forwarding_error: false,
        }
    }
}

impl CollectorConfig {
    pub fn loop_wait(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.loop_wait).ok_or_else(|| ConfigError::InvalidDuration {
            key: "collector.loop_wait",
            value: self.loop_wait.clone(),
        })
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.request_timeout).ok_or_else(|| ConfigError::InvalidDuration {
            key: "collector.request_timeout",
            value: self.request_timeout.clone(),
        })
    }
}

impl MetsyncConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MetsyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collector.loop_wait()?;
        self.collector.request_timeout()?;
        if !self.collector.endpoint.starts_with("http://") {
            return Err(ConfigError::InvalidEndpoint(self.collector.endpoint.clone()));
        }
        if self.collector.buffered_samples == 0 {
            return Err(ConfigError::Zero("collector.buffered_samples"));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = MetsyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.engine.print_every, 100);
        assert_eq!(config.engine.failure_policy, FailurePolicy::Suppress);
        assert_eq!(config.collector.buffered_samples, 100);
        assert_eq!(config.collector.loop_wait().unwrap(), Duration::from_secs(10));
        assert!(!config.collector.fatal_forwarding_error);
    }

    #[test]
    fn parse_full_document() {
        let toml_str = r#"
[engine]
print_every = 10
failure_policy = "forward-partial"
skip_duplicate_volume_timestamps = true
max_volumes = 5000

[collector]
endpoint = "http://10.0.0.5:9283/metrics"
source_name = "ceph-eu1"
loop_wait = "500ms"
buffered_samples = 8
fatal_forwarding_error = true
"#;
        let config = MetsyncConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.engine.print_every, 10);
        assert_eq!(config.engine.failure_policy, FailurePolicy::ForwardPartial);
        assert!(config.engine.skip_duplicate_volume_timestamps);
        assert_eq!(config.engine.max_volumes, Some(5000));
        assert_eq!(config.engine.max_vms, None);
        assert_eq!(config.collector.source_name, "ceph-eu1");
        assert_eq!(config.collector.loop_wait().unwrap(), Duration::from_millis(500));
        assert!(config.collector.fatal_forwarding_error);
    }

    #[test]
    fn rejects_bad_duration() {
        let err = MetsyncConfig::from_toml_str("[collector]\nloop_wait = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { key: "collector.loop_wait", .. }));
    }

    #[test]
    fn rejects_https_endpoint() {
        let err = MetsyncConfig::from_toml_str("[collector]\nendpoint = \"https://ceph/metrics\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = MetsyncConfig::from_toml_str("[collector]\nbuffered_samples = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Zero(_)));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(MetsyncConfig::from_toml_str("[engine]\nfailure_policy = \"retry\"").is_err());
    }

    #[test]
    fn from_file_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metsync.toml");
        std::fs::write(&path, "[engine]\nprint_every = 0\n").unwrap();
        let config = MetsyncConfig::from_file(&path).unwrap();
        assert_eq!(config.engine.print_every, 0);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = MetsyncConfig::from_file(Path::new("/nonexistent/metsync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = MetsyncConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("suppress"));
        assert!(MetsyncConfig::from_toml_str(&toml_str).is_ok());
    }

    #[test]
    fn example_config_is_valid() {
        let config =
            MetsyncConfig::from_toml_str(include_str!("../../../metsync.example.toml")).unwrap();
        assert_eq!(config.collector.request_timeout().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("x"), None);
    }
}
