//! Configuration loading for the sync engine

use crate::scheduler::{PollTiming, Subsystem};
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/default_config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    /// Subsystems to fetch detail for. All of them when absent.
    pub fetch: Option<Vec<Subsystem>>,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    pub poll_interval_ms: Option<u64>,
    pub slow_poll_interval_ms: Option<u64>,
    pub response_interval_ms: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub min_axes: Option<usize>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Some(1000),
            slow_poll_interval_ms: Some(4000),
            response_interval_ms: Some(700),
            poll_timeout_ms: Some(4000),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { min_axes: Some(3) }
    }
}

impl PollingConfig {
    /// Get poll interval with default fallback
    pub fn poll_interval(&self) -> u64 {
        self.poll_interval_ms.unwrap_or(1000)
    }

    /// Get the idle-display poll interval with default fallback
    pub fn slow_poll_interval(&self) -> u64 {
        self.slow_poll_interval_ms.unwrap_or(4000)
    }

    /// Get minimum gap after a response with default fallback
    pub fn response_interval(&self) -> u64 {
        self.response_interval_ms.unwrap_or(700)
    }

    /// Get lost-request timeout with default fallback
    pub fn poll_timeout(&self) -> u64 {
        self.poll_timeout_ms.unwrap_or(4000)
    }

    pub fn timing(&self) -> PollTiming {
        PollTiming {
            poll_interval: self.poll_interval(),
            response_interval: self.response_interval(),
            poll_timeout: self.poll_timeout(),
        }
    }

    /// Same as [`PollingConfig::timing`] with the slow poll interval
    pub fn slow_timing(&self) -> PollTiming {
        PollTiming {
            poll_interval: self.slow_poll_interval(),
            ..self.timing()
        }
    }
}

impl ModelConfig {
    /// Get the fewest axes the panel lays out, with default fallback
    pub fn min_axes(&self) -> usize {
        self.min_axes.unwrap_or(3)
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: SyncConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.polling.poll_interval() == 0 {
            return Err(SyncError::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.polling.poll_timeout() < self.polling.poll_interval() {
            return Err(SyncError::Config(format!(
                "poll_timeout_ms ({}) is shorter than poll_interval_ms ({})",
                self.polling.poll_timeout(),
                self.polling.poll_interval()
            )));
        }
        if self.model.min_axes() > crate::model::MAX_TOTAL_AXES {
            return Err(SyncError::Config(format!(
                "min_axes ({}) exceeds the {} axes the model holds",
                self.model.min_axes(),
                crate::model::MAX_TOTAL_AXES
            )));
        }
        Ok(())
    }

    /// Get the fetch set with default fallback
    pub fn fetch(&self) -> Vec<Subsystem> {
        self.fetch.clone().unwrap_or_else(|| Subsystem::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.polling.timing(), PollTiming::default());
        assert_eq!(config.polling.slow_timing().poll_interval, 4000);
        assert_eq!(config.fetch().len(), Subsystem::ALL.len());
        assert_eq!(config.model.min_axes(), 3);
    }

    #[test]
    fn test_partial_yaml_falls_back() {
        let config = SyncConfig::load_from_str(
            "polling:\n  poll_interval_ms: 500\nfetch: [heat, move, state]\n",
        )
        .unwrap();
        assert_eq!(config.polling.poll_interval(), 500);
        assert_eq!(config.polling.response_interval(), 700);
        assert_eq!(config.fetch(), vec![Subsystem::Heat, Subsystem::Move, Subsystem::State]);
        assert_eq!(config.model.min_axes(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SyncConfig::load_from_str("polling:\n  poll_interval_ms: 0\n"),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::load_from_str("model:\n  min_axes: 11\n"),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::load_from_str("fetch: [teleporter]\n"),
            Err(SyncError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fetch:\n  - tools\n  - spindles").unwrap();
        let config = SyncConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.fetch(), vec![Subsystem::Tools, Subsystem::Spindles]);

        assert!(matches!(
            SyncConfig::load_from_path("/nonexistent/omsync.yaml"),
            Err(SyncError::Config(_))
        ));
    }
}
