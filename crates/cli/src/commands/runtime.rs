//! Shared wiring: config → catalog, template loader, tools, store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use counsel_agent::{AdvisorSession, Orchestrator};
use counsel_config::{AppConfig, MissingFileSetting};
use counsel_core::{AdvisorSpec, EventBus, Gateway, ToolRegistry};
use counsel_memory::JsonlStore;
use counsel_prompt::{
    AdvisorCatalog, MissingFilePolicy, ResolverOptions, TagResolver, TemplateLoader,
};
use tokio_util::sync::CancellationToken;

pub struct Runtime {
    pub config: AppConfig,
    pub catalog: AdvisorCatalog,
    pub loader: TemplateLoader,
    pub registry: Arc<ToolRegistry>,
}

impl Runtime {
    /// Load config from `path` (or the default location) and wire
    /// everything that does not need the network.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match path {
            Some(path) => {
                let mut config = AppConfig::load_from(path)
                    .map_err(|e| format!("Failed to load config: {e}"))?;
                config.apply_env_overrides(|key| std::env::var(key).ok());
                config.validate()?;
                config
            }
            None => AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let missing_file = match config.prompt.missing_file {
            MissingFileSetting::Ignore => MissingFilePolicy::Ignore,
            MissingFileSetting::Require => MissingFilePolicy::Require,
        };
        let options = ResolverOptions::new(&config.paths.content_root)
            .with_missing_file(missing_file)
            .with_file_delimiter(config.prompt.file_delimiter.clone());
        let loader = TemplateLoader::new(TagResolver::new(options));

        let mut registry = counsel_tools::default_registry(&config.paths.content_root)?;
        if config.agent.tool_timeout_secs > 0 {
            registry = registry.with_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
        }

        Ok(Self {
            catalog: AdvisorCatalog::new(&config.paths.advisors_dir),
            loader,
            registry: Arc::new(registry),
            config,
        })
    }

    pub fn advisor(&self, name: &str) -> Result<AdvisorSpec, Box<dyn std::error::Error>> {
        Ok(self.catalog.load(name)?)
    }

    /// Chat history for one advisor lives in `<chats_dir>/<advisor>/`.
    pub fn store_for(&self, spec: &AdvisorSpec) -> Arc<JsonlStore> {
        Arc::new(JsonlStore::new(
            self.config.paths.chats_dir.join(spec.file_stem()),
        ))
    }

    pub fn orchestrator(
        &self,
        gateway: Arc<dyn Gateway>,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Orchestrator {
        let agent = &self.config.agent;
        let mut orchestrator = Orchestrator::new(gateway, self.registry.clone())
            .with_max_rounds(agent.max_rounds)
            .with_streaming(agent.stream)
            .with_parallel_tools(agent.parallel_tools)
            .with_event_bus(bus)
            .with_cancellation(cancel);
        if agent.stream_timeout_secs > 0 {
            orchestrator =
                orchestrator.with_stream_timeout(Duration::from_secs(agent.stream_timeout_secs));
        }
        orchestrator
    }

    pub fn session(&self, spec: AdvisorSpec, orchestrator: Orchestrator) -> AdvisorSession {
        let store = self.store_for(&spec);
        AdvisorSession::new(spec, self.loader.clone(), Arc::new(orchestrator), store)
    }
}
