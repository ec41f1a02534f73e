use std::sync::Arc;

use imagine_core::pipeline::PipelineFactory;

use crate::config::ServerConfig;
use crate::models::ModelRegistry;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: ModelRegistry,
    pub factory: Arc<dyn PipelineFactory>,
}

impl AppState {
    pub fn new(config: ServerConfig, factory: Arc<dyn PipelineFactory>) -> Self {
        let registry = ModelRegistry::new(config.models_dir.clone());
        Self {
            config,
            registry,
            factory,
        }
    }
}
