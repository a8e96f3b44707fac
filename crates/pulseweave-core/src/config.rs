//! Configuration for the task processor.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. explicit path passed by the caller
//!   2. $PULSEWEAVE_CONFIG
//!   3. none (defaults only)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::EvictionPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub workers: WorkerConfig,
    pub cleanup: CleanupConfig,
    pub predictor: PredictorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers. 0 is treated as 1.
    pub count: usize,
    /// Max wait per dequeue; also the shutdown checkpoint.
    pub poll_interval_ms: u64,
    /// Deadline for one predictor call. 0 = unbounded.
    pub predict_timeout_ms: u64,
    /// Pause before restarting a worker loop that crashed.
    pub failure_backoff_ms: u64,
    /// How long shutdown waits for workers before aborting them.
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    /// Records older than this are evicted.
    pub retention_secs: u64,
    pub policy: EvictionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub name: String,
    /// Artificial latency for the keyword predictor.
    pub latency_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 3,
            poll_interval_ms: 1_000,
            predict_timeout_ms: 0,
            failure_backoff_ms: 1_000,
            shutdown_grace_ms: 1_000,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            retention_secs: 24 * 3_600,
            policy: EvictionPolicy::AnyStatus,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            name: "keyword".to_string(),
            latency_ms: 0,
        }
    }
}

// ── Typed accessors ───────────────────────────────────────────────────────────

impl WorkerConfig {
    pub fn worker_count(&self) -> usize {
        self.count.max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn predict_timeout(&self) -> Option<Duration> {
        (self.predict_timeout_ms > 0).then(|| Duration::from_millis(self.predict_timeout_ms))
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.retention_secs).unwrap_or(i64::MAX / 1_000))
    }
}

impl PredictorConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PulseConfig {
    /// Load config: env vars → file → defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PULSEWEAVE_CONFIG").ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => PulseConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        Self::from_toml_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply PULSEWEAVE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PULSEWEAVE_WORKERS__COUNT")
            && let Ok(n) = v.parse()
        {
            self.workers.count = n;
        }
        if let Ok(v) = std::env::var("PULSEWEAVE_CLEANUP__RETENTION_SECS")
            && let Ok(n) = v.parse()
        {
            self.cleanup.retention_secs = n;
        }
    }
}
