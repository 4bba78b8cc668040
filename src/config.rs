//! Pipeline configuration
//!
//! Settings load from environment variables, falling back to defaults for
//! anything unset.
//!
//! # Environment Variables
//!
//! - `CALLSCOPE_SCHEMA_VERSION`: marker schema (`v2|v3`) - default: `v3`
//! - `CALLSCOPE_CHUNK_WINDOW_SECS`: chunk window in seconds - default: `75`
//! - `CALLSCOPE_CHUNK_OVERLAP_SECS`: chunk overlap in seconds - default: `10`
//! - `CALLSCOPE_EXTRACTION_DELAY_MS`: pause between extraction calls - default: `500`
//! - `CALLSCOPE_BATCH_CONCURRENCY`: calls processed at once - default: `3`

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::chunker::ChunkerConfig;
use crate::schema::SchemaVersion;

const DEFAULT_EXTRACTION_DELAY_MS: u64 = 500;
const DEFAULT_BATCH_CONCURRENCY: usize = 3;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Schema requested from the extractor and used for aggregation
    pub schema_version: SchemaVersion,
    pub chunking: ChunkerConfig,
    /// Pause between consecutive extraction calls for one call
    pub extraction_delay: Duration,
    /// Maximum calls in flight in batch and submit mode
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: SchemaVersion::V3,
            chunking: ChunkerConfig::default(),
            extraction_delay: Duration::from_millis(DEFAULT_EXTRACTION_DELAY_MS),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Load from `CALLSCOPE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(version) = parse_var(&lookup, "CALLSCOPE_SCHEMA_VERSION")? {
            config.schema_version = version;
        }
        if let Some(window) = parse_var(&lookup, "CALLSCOPE_CHUNK_WINDOW_SECS")? {
            config.chunking.window_seconds = window;
        }
        if let Some(overlap) = parse_var(&lookup, "CALLSCOPE_CHUNK_OVERLAP_SECS")? {
            config.chunking.overlap_seconds = overlap;
        }
        if let Some(delay) = parse_var::<u64>(&lookup, "CALLSCOPE_EXTRACTION_DELAY_MS")? {
            config.extraction_delay = Duration::from_millis(delay);
        }
        if let Some(concurrency) = parse_var(&lookup, "CALLSCOPE_BATCH_CONCURRENCY")? {
            config.batch_concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_extraction_delay(mut self, delay: Duration) -> Self {
        self.extraction_delay = delay;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        self.chunking.validate().map_err(ConfigError::ValidationFailed)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::ParseError {
                field: key.to_string(),
                error: e.to_string(),
            }),
    }
}
