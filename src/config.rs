//! JSON configuration for one receiving cache and its apply executor.

use crate::executor::{ExecutorConfig, ExecutorConfigError};
use crate::xsite::HashPartitioner;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_NUM_SEGMENTS: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XsiteConfig {
    pub cache_name: String,
    pub num_segments: u32,
    pub executor: ExecutorConfig,
}

impl Default for XsiteConfig {
    fn default() -> Self {
        Self {
            cache_name: "default".into(),
            num_segments: DEFAULT_NUM_SEGMENTS,
            executor: ExecutorConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache_name must not be empty")]
    EmptyCacheName,
    #[error("num_segments must be greater than zero")]
    ZeroSegments,
    #[error(transparent)]
    Executor(#[from] ExecutorConfigError),
}

impl XsiteConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: XsiteConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::EmptyCacheName);
        }
        if self.num_segments == 0 {
            return Err(ConfigError::ZeroSegments);
        }
        self.executor.validate()?;
        Ok(())
    }

    pub fn partitioner(&self) -> HashPartitioner {
        HashPartitioner::new(self.num_segments)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<XsiteConfig, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    XsiteConfig::from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadCapability;

    #[test]
    fn missing_fields_take_defaults() {
        let config = XsiteConfig::from_json_str(r#"{"cache_name": "users"}"#).unwrap();
        assert_eq!(config.cache_name, "users");
        assert_eq!(config.num_segments, DEFAULT_NUM_SEGMENTS);
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn executor_section_is_parsed() {
        let config = XsiteConfig::from_json_str(
            r#"{
                "cache_name": "sessions",
                "num_segments": 16,
                "executor": {"name": "remote-apply", "max_workers": 2, "worker_capability": "non_blocking"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.executor.name, "remote-apply");
        assert_eq!(config.executor.max_workers, 2);
        assert_eq!(config.executor.queue_capacity, 256);
        assert_eq!(
            config.executor.worker_capability,
            ThreadCapability::NonBlocking
        );
    }

    #[test]
    fn zero_segments_and_bad_executor_are_rejected() {
        assert!(matches!(
            XsiteConfig::from_json_str(r#"{"num_segments": 0}"#),
            Err(ConfigError::ZeroSegments)
        ));
        assert!(matches!(
            XsiteConfig::from_json_str(r#"{"executor": {"queue_capacity": 0}}"#),
            Err(ConfigError::Executor(ExecutorConfigError::ZeroQueue { .. }))
        ));
        assert!(matches!(
            XsiteConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
