//! Run configuration

use crate::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tradeflow_core::Role;
use tradeflow_llm::CallPolicy;
use tradeflow_runtime::WorkerConfig;
use tradeflow_utils::{env_duration_secs, env_var};

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Bull/bear debate rounds when the risk gate passes
    pub max_debate_rounds: usize,

    /// Revisions of the trading plan before the final review
    pub max_revisions: usize,

    /// Generation round-trips per worker, forced final turn included
    pub max_tool_iterations: usize,

    /// Tool requests executed per worker turn; the rest are skipped
    pub max_tool_requests_per_turn: usize,

    /// Timeout for a single generator or tool call
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,

    /// Retries after a transient generator failure
    pub max_retries: u32,

    /// First retry delay; doubles on each further attempt
    #[serde(with = "duration_secs")]
    pub retry_backoff_base: Duration,

    /// Generator requests per minute shared by the whole run
    pub requests_per_minute: Option<u32>,

    /// Workers of one fan-out group running at the same time
    pub max_concurrency: usize,

    /// Sector override for the risk gate; otherwise the reported sector
    pub sector: Option<String>,

    /// Analyst fan-out group
    pub analysts: Vec<Role>,

    /// Model passed to the generator
    pub model: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_debate_rounds: 1,
            max_revisions: 2,
            max_tool_iterations: 5,
            max_tool_requests_per_turn: 3,
            call_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_backoff_base: Duration::from_secs(1),
            requests_per_minute: None,
            max_concurrency: 4,
            sector: None,
            analysts: Role::ANALYSTS.to_vec(),
            model: "default".to_string(),
        }
    }
}

impl RunConfig {
    /// Create a new configuration builder
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Overlay `TRADEFLOW_*` environment variables
    ///
    /// Recognized keys: `TRADEFLOW_MAX_DEBATE_ROUNDS`, `TRADEFLOW_MAX_REVISIONS`,
    /// `TRADEFLOW_MAX_TOOL_ITERATIONS`, `TRADEFLOW_MAX_TOOL_REQUESTS`,
    /// `TRADEFLOW_CALL_TIMEOUT_SECS`, `TRADEFLOW_MAX_RETRIES`,
    /// `TRADEFLOW_RETRY_BACKOFF_SECS`, `TRADEFLOW_REQUESTS_PER_MINUTE`,
    /// `TRADEFLOW_MAX_CONCURRENCY`, `TRADEFLOW_SECTOR`, `TRADEFLOW_MODEL`.
    pub fn with_env(mut self) -> Result<Self> {
        let env_err = |e: tradeflow_utils::EnvError| WorkflowError::ConfigError(e.to_string());

        if let Some(v) = env_var("TRADEFLOW_MAX_DEBATE_ROUNDS").map_err(env_err)? {
            self.max_debate_rounds = v;
        }
        if let Some(v) = env_var("TRADEFLOW_MAX_REVISIONS").map_err(env_err)? {
            self.max_revisions = v;
        }
        if let Some(v) = env_var("TRADEFLOW_MAX_TOOL_ITERATIONS").map_err(env_err)? {
            self.max_tool_iterations = v;
        }
        if let Some(v) = env_var("TRADEFLOW_MAX_TOOL_REQUESTS").map_err(env_err)? {
            self.max_tool_requests_per_turn = v;
        }
        if let Some(v) = env_duration_secs("TRADEFLOW_CALL_TIMEOUT_SECS").map_err(env_err)? {
            self.call_timeout = v;
        }
        if let Some(v) = env_var("TRADEFLOW_MAX_RETRIES").map_err(env_err)? {
            self.max_retries = v;
        }
        if let Some(v) = env_duration_secs("TRADEFLOW_RETRY_BACKOFF_SECS").map_err(env_err)? {
            self.retry_backoff_base = v;
        }
        if let Some(v) = env_var("TRADEFLOW_REQUESTS_PER_MINUTE").map_err(env_err)? {
            self.requests_per_minute = Some(v);
        }
        if let Some(v) = env_var("TRADEFLOW_MAX_CONCURRENCY").map_err(env_err)? {
            self.max_concurrency = v;
        }
        if let Some(v) = env_var::<String>("TRADEFLOW_SECTOR").map_err(env_err)? {
            self.sector = Some(v);
        }
        if let Some(v) = env_var::<String>("TRADEFLOW_MODEL").map_err(env_err)? {
            self.model = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_tool_iterations == 0 {
            return Err(WorkflowError::ConfigError(
                "max_tool_iterations must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(WorkflowError::ConfigError(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.call_timeout.is_zero() {
            return Err(WorkflowError::ConfigError(
                "call_timeout must be greater than 0".to_string(),
            ));
        }

        if self.requests_per_minute == Some(0) {
            return Err(WorkflowError::ConfigError(
                "requests_per_minute must be greater than 0 when set".to_string(),
            ));
        }

        if self.analysts.is_empty() {
            return Err(WorkflowError::ConfigError(
                "at least one analyst is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for role in &self.analysts {
            if !role.is_analyst() {
                return Err(WorkflowError::ConfigError(format!(
                    "{role} is not an analyst role"
                )));
            }
            if !seen.insert(*role) {
                return Err(WorkflowError::ConfigError(format!(
                    "analyst {role} listed twice"
                )));
            }
        }

        Ok(())
    }

    /// Retry and timeout policy for generator calls
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy::new(self.max_retries, self.retry_backoff_base, self.call_timeout)
    }

    /// Loop configuration for every worker of the run
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_iterations: self.max_tool_iterations,
            model: self.model.clone(),
            ..WorkerConfig::default()
        }
    }
}

/// Builder for RunConfig
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    max_debate_rounds: Option<usize>,
    max_revisions: Option<usize>,
    max_tool_iterations: Option<usize>,
    max_tool_requests_per_turn: Option<usize>,
    call_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff_base: Option<Duration>,
    requests_per_minute: Option<u32>,
    max_concurrency: Option<usize>,
    sector: Option<String>,
    analysts: Option<Vec<Role>>,
    model: Option<String>,
}

impl RunConfigBuilder {
    pub fn max_debate_rounds(mut self, rounds: usize) -> Self {
        self.max_debate_rounds = Some(rounds);
        self
    }

    pub fn max_revisions(mut self, revisions: usize) -> Self {
        self.max_revisions = Some(revisions);
        self
    }

    pub fn max_tool_iterations(mut self, iterations: usize) -> Self {
        self.max_tool_iterations = Some(iterations);
        self
    }

    pub fn max_tool_requests_per_turn(mut self, requests: usize) -> Self {
        self.max_tool_requests_per_turn = Some(requests);
        self
    }

    /// Set the per-call timeout
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set retry backoff base duration
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.retry_backoff_base = Some(duration);
        self
    }

    pub fn requests_per_minute(mut self, limit: u32) -> Self {
        self.requests_per_minute = Some(limit);
        self
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = Some(workers);
        self
    }

    /// Force the risk gate's sector profile
    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Replace the analyst fan-out group
    pub fn analysts(mut self, analysts: impl IntoIterator<Item = Role>) -> Self {
        self.analysts = Some(analysts.into_iter().collect());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<RunConfig> {
        let defaults = RunConfig::default();

        let config = RunConfig {
            max_debate_rounds: self.max_debate_rounds.unwrap_or(defaults.max_debate_rounds),
            max_revisions: self.max_revisions.unwrap_or(defaults.max_revisions),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(defaults.max_tool_iterations),
            max_tool_requests_per_turn: self
                .max_tool_requests_per_turn
                .unwrap_or(defaults.max_tool_requests_per_turn),
            call_timeout: self.call_timeout.unwrap_or(defaults.call_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_base: self.retry_backoff_base.unwrap_or(defaults.retry_backoff_base),
            requests_per_minute: self.requests_per_minute.or(defaults.requests_per_minute),
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            sector: self.sector.or(defaults.sector),
            analysts: self.analysts.unwrap_or(defaults.analysts),
            model: self.model.unwrap_or(defaults.model),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Durations as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.max_debate_rounds, 1);
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.max_tool_iterations, 5);
        assert_eq!(config.max_tool_requests_per_turn, 3);
        assert_eq!(config.call_timeout, Duration::from_secs(120));
        assert_eq!(config.analysts, Role::ANALYSTS.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::builder()
            .max_revisions(1)
            .call_timeout(Duration::from_secs(30))
            .sector("Banking")
            .analysts([Role::FundamentalsAnalyst, Role::NewsAnalyst])
            .build()
            .unwrap();

        assert_eq!(config.max_revisions, 1);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.sector.as_deref(), Some("Banking"));
        assert_eq!(config.analysts.len(), 2);
        assert_eq!(config.worker_config().max_iterations, 5);
        assert_eq!(config.call_policy().max_attempts, 4);
    }

    #[test]
    fn test_validation_rejects_bad_analysts() {
        let not_analyst = RunConfig {
            analysts: vec![Role::Trader],
            ..Default::default()
        };
        assert!(not_analyst.validate().is_err());

        let duplicate = RunConfig {
            analysts: vec![Role::NewsAnalyst, Role::NewsAnalyst],
            ..Default::default()
        };
        assert!(duplicate.validate().is_err());

        let empty = RunConfig::builder().analysts([]).build();
        assert!(matches!(empty, Err(WorkflowError::ConfigError(_))));
    }

    #[test]
    fn test_validation_rejects_zero_caps() {
        assert!(RunConfig::builder().max_tool_iterations(0).build().is_err());
        assert!(RunConfig::builder().max_concurrency(0).build().is_err());
        assert!(RunConfig::builder().requests_per_minute(0).build().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{"max_revisions": 0, "call_timeout": 2.5, "analysts": ["fundamentals_analyst"]}"#,
        )
        .unwrap();

        assert_eq!(config.max_revisions, 0);
        assert_eq!(config.call_timeout, Duration::from_millis(2500));
        assert_eq!(config.analysts, vec![Role::FundamentalsAnalyst]);
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_env_overlay() {
        // SAFETY: no other test reads these keys
        unsafe {
            std::env::set_var("TRADEFLOW_MAX_DEBATE_ROUNDS", "3");
            std::env::set_var("TRADEFLOW_CALL_TIMEOUT_SECS", "10");
        }

        let config = RunConfig::default().with_env().unwrap();

        unsafe {
            std::env::remove_var("TRADEFLOW_MAX_DEBATE_ROUNDS");
            std::env::remove_var("TRADEFLOW_CALL_TIMEOUT_SECS");
        }

        assert_eq!(config.max_debate_rounds, 3);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
    }
}
