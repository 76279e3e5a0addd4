//! Worker runtime with shared resources
//!
//! The [`WorkerRuntime`] holds what every worker of a run shares (the
//! generator, the tool router, the call policy with its request budget)
//! and builds
//! [`WorkerTask`]s for individual roles.

use crate::worker::{WorkerConfig, WorkerTask};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use tradeflow_core::{Error, Message, Result, Role};
use tradeflow_llm::{CallPolicy, Generator, RateLimit, ToolDefinition};
use tradeflow_tools::{ToolRegistry, ToolRouter};

/// Shared resources and factory for worker tasks
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tradeflow_core::{Message, Role};
/// use tradeflow_llm::ScriptedGenerator;
/// use tradeflow_runtime::WorkerRuntime;
///
/// let runtime = WorkerRuntime::builder()
///     .generator(Arc::new(ScriptedGenerator::new()))
///     .max_iterations(3)
///     .build()
///     .unwrap();
///
/// let task = runtime.create_worker(Role::NewsAnalyst, "You read the news.", vec![Message::user("AAPL")]);
/// assert_eq!(task.role(), Role::NewsAnalyst);
/// ```
#[derive(Clone)]
pub struct WorkerRuntime {
    generator: Arc<dyn Generator>,
    router: ToolRouter,
    policy: CallPolicy,
    config: WorkerConfig,
    role_tools: HashMap<Role, Vec<String>>,
}

impl WorkerRuntime {
    /// Create a new runtime builder
    pub fn builder() -> WorkerRuntimeBuilder {
        WorkerRuntimeBuilder::new()
    }

    /// Get a reference to the generator
    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Tool definitions offered to a role
    ///
    /// Roles with an explicit assignment see only those tools; other roles
    /// see the whole registry.
    pub fn tools_for(&self, role: Role) -> Vec<ToolDefinition> {
        match self.role_tools.get(&role) {
            Some(names) => self.router.registry().definitions_for(names),
            None => self.router.registry().definitions(),
        }
    }

    /// Create a worker for `role` with the default loop bound
    pub fn create_worker(
        &self,
        role: Role,
        system_prompt: impl Into<String>,
        seed: Vec<Message>,
    ) -> WorkerTask {
        self.create_worker_with_config(role, system_prompt, seed, self.config.clone())
    }

    /// Create a worker with an explicit loop configuration
    pub fn create_worker_with_config(
        &self,
        role: Role,
        system_prompt: impl Into<String>,
        seed: Vec<Message>,
        config: WorkerConfig,
    ) -> WorkerTask {
        WorkerTask::new(
            role,
            system_prompt,
            seed,
            self.tools_for(role),
            config,
            self.generator.clone(),
            self.router.clone(),
            self.policy.clone(),
        )
    }
}

impl std::fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("generator", &self.generator.name())
            .field("router", &self.router)
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for WorkerRuntime
pub struct WorkerRuntimeBuilder {
    generator: Option<Arc<dyn Generator>>,
    tool_registry: Arc<ToolRegistry>,
    policy: CallPolicy,
    config: WorkerConfig,
    max_tool_requests_per_turn: usize,
    requests_per_minute: Option<u32>,
    role_tools: HashMap<Role, Vec<String>>,
}

impl WorkerRuntimeBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            generator: None,
            tool_registry: Arc::new(ToolRegistry::default()),
            policy: CallPolicy::default(),
            config: WorkerConfig::default(),
            max_tool_requests_per_turn: 3,
            requests_per_minute: None,
            role_tools: HashMap::new(),
        }
    }

    /// Set the generative backend
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the tool registry
    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = registry;
        self
    }

    /// Set the call policy (retries, backoff, per-call timeout)
    pub fn call_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the full worker configuration
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set maximum iterations
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Cap on tool requests executed per worker turn
    pub fn max_tool_requests_per_turn(mut self, max: usize) -> Self {
        self.max_tool_requests_per_turn = max;
        self
    }

    /// Shared request budget across every generator call of the run
    pub fn requests_per_minute(mut self, limit: Option<u32>) -> Self {
        self.requests_per_minute = limit;
        self
    }

    /// Restrict a role to the named tools
    pub fn role_tools<I, S>(mut self, role: Role, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_tools
            .insert(role, names.into_iter().map(Into::into).collect());
        self
    }

    /// Build the runtime
    pub fn build(self) -> Result<WorkerRuntime> {
        let generator = self
            .generator
            .ok_or_else(|| Error::InitializationFailed("Generator not set".to_string()))?;

        if self.config.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let policy = self
            .policy
            .with_rate_limit(RateLimit::from_limit(self.requests_per_minute));
        let router = ToolRouter::new(
            self.tool_registry,
            self.max_tool_requests_per_turn,
            policy.call_timeout,
        );

        info!(
            generator = generator.name(),
            tools = router.registry().len(),
            max_iterations = self.config.max_iterations,
            requests_per_minute = ?self.requests_per_minute,
            "Worker runtime ready"
        );

        Ok(WorkerRuntime {
            generator,
            router,
            policy,
            config: self.config,
            role_tools: self.role_tools,
        })
    }
}

impl Default for WorkerRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tradeflow_llm::ScriptedGenerator;
    use tradeflow_tools::{Tool, ToolOutput};

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.0, self.0, json!({}))
        }

        async fn call(&self, _arguments: Value) -> ToolOutput {
            ToolOutput::Text(self.0.to_string())
        }
    }

    #[test]
    fn test_builder_requires_generator() {
        let err = WorkerRuntime::builder().build().unwrap_err();
        assert!(matches!(err, Error::InitializationFailed(_)));
    }

    #[test]
    fn test_builder_rejects_zero_iterations() {
        let err = WorkerRuntime::builder()
            .generator(Arc::new(ScriptedGenerator::new()))
            .max_iterations(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_role_tool_assignment() {
        let registry = ToolRegistry::builder()
            .register(Arc::new(NamedTool("quote")))
            .register(Arc::new(NamedTool("news")))
            .build();

        let runtime = WorkerRuntime::builder()
            .generator(Arc::new(ScriptedGenerator::new()))
            .tool_registry(Arc::new(registry))
            .role_tools(Role::NewsAnalyst, ["news"])
            .max_tool_requests_per_turn(2)
            .build()
            .unwrap();

        let news: Vec<String> = runtime
            .tools_for(Role::NewsAnalyst)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(news, vec!["news".to_string()]);
        assert_eq!(runtime.tools_for(Role::MarketAnalyst).len(), 2);
        assert_eq!(runtime.router().max_requests_per_turn(), 2);
    }

    #[test]
    fn test_requests_per_minute_attaches_rate_limit() {
        let limited = WorkerRuntime::builder()
            .generator(Arc::new(ScriptedGenerator::new()))
            .requests_per_minute(Some(30))
            .build()
            .unwrap();
        assert!(limited.policy().rate_limit.is_some());

        let unlimited = WorkerRuntime::builder()
            .generator(Arc::new(ScriptedGenerator::new()))
            .requests_per_minute(Some(0))
            .build()
            .unwrap();
        assert!(unlimited.policy().rate_limit.is_none());
    }
}
