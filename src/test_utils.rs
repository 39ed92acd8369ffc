//! Test utilities for LexAI
//!
//! Helpers for building a configuration that points at a temporary log
//! directory and a chat service whose engines are all scripted.

use crate::chat::ChatService;
use crate::config::Config;
use crate::engines::{Engine, ScriptedEngine};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Default configuration with logs under `log_dir` and warm-up disabled
pub fn test_config(log_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.log_dir = log_dir.to_path_buf();
    config.chat.warm_up = false;
    config
}

/// Chat service backed by scripted engines
///
/// Each engine is registered under its variant name; configured variants
/// without a supplied engine get a default scripted one, so no test ever
/// reaches the network.
///
/// # Panics
///
/// Panics if the temporary directory or store cannot be created
pub fn scripted_service(engines: Vec<ScriptedEngine>) -> (ChatService, TempDir) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let config = test_config(dir.path());
    let service = ChatService::from_config(config).expect("Failed to create chat service");

    for engine in engines {
        let variant = engine.info().variant.clone();
        service
            .registry()
            .register(&variant, Arc::new(engine), false)
            .expect("Failed to register engine");
    }
    let variants: Vec<String> = service.config().variants.keys().cloned().collect();
    for variant in variants {
        if !service.registry().is_loaded(&variant) {
            service
                .registry()
                .register(&variant, Arc::new(ScriptedEngine::new(variant.clone())), false)
                .expect("Failed to register engine");
        }
    }

    (service, dir)
}
