//! OCR engine implementations
//!
//! Engines are conditionally compiled based on feature flags. The registry
//! only hands out engines; preprocessing never depends on one being present.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

use crate::engine::OcrEngine;
use crate::error::PreprocessError;
use serde::Serialize;
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Registry of available OCR engines. The first registered engine is the default.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl EngineRegistry {
    /// Registry with no engines; `/ocr` and `--ocr` report an error against it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Initialize every engine compiled into this build.
    pub fn load() -> Result<Self, PreprocessError> {
        #[allow(unused_mut)]
        let mut registry = Self::empty();

        #[cfg(feature = "engine-ocrs")]
        {
            tracing::info!("Initializing ocrs engine...");
            registry.register(Arc::new(ocrs::OcrsEngine::new()?));
        }

        if registry.engines.is_empty() {
            tracing::warn!("No OCR engines compiled in; build with --features engine-ocrs");
        }

        Ok(registry)
    }

    pub fn register(&mut self, engine: Arc<dyn OcrEngine>) {
        tracing::debug!("Registered OCR engine {}", engine.name());
        self.engines.push(engine);
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn OcrEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Get the default engine
    pub fn default_engine(&self) -> Option<Arc<dyn OcrEngine>> {
        self.engines.first().cloned()
    }

    /// List all available engine names
    pub fn list(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
            })
            .collect()
    }
}
