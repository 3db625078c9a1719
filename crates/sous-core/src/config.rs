//! Service configuration: an explicit record of the recognized options,
//! resolved from the environment once at startup. Each worker receives only
//! the slice it needs.

use std::env;
use std::time::Duration;

use thiserror::Error;

use sous_db::config::DbConfig;

/// Default name of the chore topic.
pub const DEFAULT_CHORES_TOPIC: &str = "chores";
/// Default name of the data-changes topic.
pub const DEFAULT_DATA_CHANGES_TOPIC: &str = "data_changes";

/// Errors raised while resolving configuration. These are fatal: the process
/// exits non-zero rather than running with a half-configured service.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Names of the topics the service publishes to and consumes from.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub chores: String,
    pub data_changes: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            chores: DEFAULT_CHORES_TOPIC.to_owned(),
            data_changes: DEFAULT_DATA_CHANGES_TOPIC.to_owned(),
        }
    }
}

/// The full configuration record for the planner service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub topics: TopicConfig,
    /// When set, every worker invocation and the scheduler tick become
    /// no-ops so queues can drain safely.
    pub cease_operation: bool,
    /// Deadline for a single outbound webhook POST.
    pub webhook_timeout: Duration,
    /// Votes required per event before a plan can finalize.
    pub vote_threshold: usize,
    /// Deadline for handling a single message.
    pub message_deadline: Duration,
    /// Grace window for draining in-flight messages at shutdown.
    pub drain_grace: Duration,
    /// Optional trace collector endpoint, recorded for the subscriber setup.
    pub tracing_endpoint: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            topics: TopicConfig::default(),
            cease_operation: false,
            webhook_timeout: Duration::from_secs(10),
            vote_threshold: 1,
            message_deadline: Duration::from_secs(30),
            drain_grace: Duration::from_secs(30),
            tracing_endpoint: None,
        }
    }
}

impl ServiceConfig {
    /// Resolve the configuration from the environment.
    ///
    /// Recognized variables: `SOUS_DATABASE_URL`, `CHORES_TOPIC_NAME`,
    /// `DATA_CHANGES_TOPIC_NAME`, `CEASE_OPERATION`,
    /// `SOUS_WEBHOOK_TIMEOUT_SECS`, `SOUS_VOTE_THRESHOLD`,
    /// `SOUS_TRACING_ENDPOINT`. Every option has a default; an invalid value
    /// is a fatal error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            db: DbConfig::from_env(),
            ..Self::default()
        };

        if let Ok(name) = env::var("CHORES_TOPIC_NAME") {
            config.topics.chores = name;
        }
        if let Ok(name) = env::var("DATA_CHANGES_TOPIC_NAME") {
            config.topics.data_changes = name;
        }

        config.cease_operation = flag_from_env("CEASE_OPERATION");

        if let Ok(value) = env::var("SOUS_WEBHOOK_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: "SOUS_WEBHOOK_TIMEOUT_SECS",
                value: value.clone(),
                reason: "expected an integer number of seconds".to_owned(),
            })?;
            config.webhook_timeout = Duration::from_secs(secs);
        }

        if let Ok(value) = env::var("SOUS_VOTE_THRESHOLD") {
            let threshold: usize = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: "SOUS_VOTE_THRESHOLD",
                value: value.clone(),
                reason: "expected a positive integer".to_owned(),
            })?;
            if threshold == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "SOUS_VOTE_THRESHOLD",
                    value,
                    reason: "threshold must be at least 1".to_owned(),
                });
            }
            config.vote_threshold = threshold;
        }

        config.tracing_endpoint = env::var("SOUS_TRACING_ENDPOINT").ok();

        Ok(config)
    }
}

/// Parse a boolean flag from the environment: `true`, `1`, and `yes`
/// (case-insensitive) count as set.
fn flag_from_env(var: &str) -> bool {
    env::var(var)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
        .unwrap_or(false)
}
