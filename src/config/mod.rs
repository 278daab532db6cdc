//! Configuration loading and validation.

mod client;
mod queue;
mod storage;

pub use client::{
    CursorMode, ProducerConfig, RetryConfig, TailConfig, DEFAULT_HISTORY, DEFAULT_TAIL_POLL_MS,
};
pub use queue::{QueueConfig, QueueType, DEFAULT_QUEUE_NAME, POISON_SUFFIX};
pub use storage::{StorageConfig, StorageType, DEFAULT_TABLE};

use serde::Deserialize;

/// Default config file name (searched for in the current directory).
pub const DEFAULT_CONFIG_FILE: &str = "chat-relay.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CHAT_RELAY_CONFIG";
/// Prefix for environment variable overrides.
pub const CONFIG_ENV_PREFIX: &str = "CHAT_RELAY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CHAT_RELAY_LOG";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table store configuration.
    pub storage: StorageConfig,
    /// Work queue configuration.
    pub queue: QueueConfig,
    /// Tail reader configuration.
    pub tail: TailConfig,
    /// Message generator configuration.
    pub producer: ProducerConfig,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `chat-relay.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that cannot be expressed by the types alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.storage_type == StorageType::Sqlite
            && self.storage.connection.trim().is_empty()
        {
            return Err(ConfigError::Missing("storage.connection"));
        }

        let table = &self.storage.table;
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ConfigError::Invalid {
                key: "storage.table",
                reason: format!("{table:?} must be non-empty and use [A-Za-z0-9_.-]"),
            });
        }

        if self.queue.queue_type == QueueType::Sqlite
            && self.queue.connection_or(&self.storage).trim().is_empty()
        {
            return Err(ConfigError::Missing("queue.connection"));
        }
        if self.queue.name.trim().is_empty() {
            return Err(ConfigError::Missing("queue.name"));
        }
        if self.queue.max_deliveries == 0 {
            return Err(ConfigError::Invalid {
                key: "queue.max_deliveries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "queue.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.tail.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "tail.poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }

        if self.producer.min_delay_ms > self.producer.max_delay_ms {
            return Err(ConfigError::Invalid {
                key: "producer.min_delay_ms",
                reason: format!(
                    "{} exceeds producer.max_delay_ms {}",
                    self.producer.min_delay_ms, self.producer.max_delay_ms
                ),
            });
        }

        Ok(())
    }

    /// Create config for testing: in-memory storage and queue, fast polling.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::memory(),
            queue: QueueConfig {
                poll_interval_ms: 10,
                ..Default::default()
            },
            tail: TailConfig {
                poll_interval_ms: 10,
                ..Default::default()
            },
            producer: ProducerConfig {
                enabled: false,
                ..Default::default()
            },
            retry: RetryConfig { delay_ms: 10 },
        }
    }
}
