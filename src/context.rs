//! Application context providing dependency injection root.

use std::sync::Arc;

use crate::config::Config;
use crate::di::Context as ContextDerive;
use crate::error::MapperError;
use crate::mapping::{LoadContext, Registry};
use crate::sparql::backends::http::HttpClient;
use crate::sparql::SparqlExecutor;

/// Root application context for dependency injection.
///
/// The Context holds all shared dependencies and uses `#[derive(Context)]`
/// to generate `FromRef` implementations for each field, enabling
/// compile-time dependency resolution.
#[derive(ContextDerive, Clone)]
pub struct Context {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Frozen descriptor registry.
    pub registry: Arc<Registry>,
    /// Store the repositories query and update.
    pub executor: Arc<dyn SparqlExecutor>,
}

impl Context {
    /// Creates a new context with the given dependencies.
    pub fn new(config: Config, registry: Arc<Registry>, executor: Arc<dyn SparqlExecutor>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            executor,
        }
    }

    /// Creates a context talking to the configured SPARQL endpoint.
    pub fn connect(config: Config, registry: Arc<Registry>) -> Result<Self, MapperError> {
        let client = HttpClient::new(&config.sparql)?;
        Ok(Self::new(config, registry, Arc::new(client)))
    }

    /// Proxy context reading across all graphs.
    pub fn load_context(&self) -> LoadContext {
        LoadContext::new(self.executor.clone(), self.registry.clone())
    }
}
