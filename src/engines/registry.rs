//! Engine registry
//!
//! Engines are constructed lazily on first use of a variant and cached
//! for the lifetime of the process. The registry also owns the
//! process-wide generation lock taken by engines that cannot serve
//! concurrent generations.

use super::base::{Completion, Message, RawStream};
use super::{create_engine, Engine, EngineInfo};
use crate::config::{Config, GenerationConfig, VariantConfig};
use crate::error::{LexaiError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Cache of engines keyed by variant name
pub struct EngineRegistry {
    variants: BTreeMap<String, VariantConfig>,
    generation: GenerationConfig,
    engines: RwLock<HashMap<String, Arc<dyn Engine>>>,
    generation_lock: Arc<Mutex<()>>,
}

impl EngineRegistry {
    /// Create an empty registry for the configured variants
    pub fn new(config: &Config) -> Self {
        Self {
            variants: config.variants.clone(),
            generation: config.generation,
            engines: RwLock::new(HashMap::new()),
            generation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Get the engine for a variant, constructing it on first use
    ///
    /// # Errors
    ///
    /// Returns [`LexaiError::UnknownVariant`] for variants that are not
    /// configured, or a configuration error if construction fails
    pub fn get(&self, variant: &str) -> Result<Arc<dyn Engine>> {
        {
            let engines = self.engines.read().map_err(|_| {
                LexaiError::Config("Failed to acquire read lock on engine registry".to_string())
            })?;
            if let Some(engine) = engines.get(variant) {
                return Ok(Arc::clone(engine));
            }
        }

        let config = self
            .variants
            .get(variant)
            .ok_or_else(|| LexaiError::UnknownVariant(variant.to_string()))?;

        let mut engines = self.engines.write().map_err(|_| {
            LexaiError::Config("Failed to acquire write lock on engine registry".to_string())
        })?;
        if let Some(engine) = engines.get(variant) {
            return Ok(Arc::clone(engine));
        }

        let engine = create_engine(variant, config, &self.generation)?;
        let engine = self.wrap(engine, config.serializes());
        engines.insert(variant.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Install a ready-made engine for a variant
    ///
    /// When `serialize` is set, the engine takes the shared generation lock.
    pub fn register(&self, variant: &str, engine: Arc<dyn Engine>, serialize: bool) -> Result<()> {
        let engine = self.wrap(engine, serialize);
        let mut engines = self.engines.write().map_err(|_| {
            LexaiError::Config("Failed to acquire write lock on engine registry".to_string())
        })?;
        engines.insert(variant.to_string(), engine);
        Ok(())
    }

    /// Whether an engine has been constructed or registered for a variant
    pub fn is_loaded(&self, variant: &str) -> bool {
        self.engines
            .read()
            .map(|engines| engines.contains_key(variant))
            .unwrap_or(false)
    }

    /// Construct and ping every configured variant
    ///
    /// Failures are logged, not fatal. Returns the number of engines that
    /// answered.
    pub async fn warm_up(&self) -> usize {
        let engines: Vec<(String, Result<Arc<dyn Engine>>)> = self
            .variants
            .keys()
            .map(|variant| (variant.clone(), self.get(variant)))
            .collect();

        let pings = engines.into_iter().map(|(variant, engine)| async move {
            let result = match engine {
                Ok(engine) => engine.ping().await,
                Err(e) => Err(e),
            };
            (variant, result)
        });

        let mut ready = 0;
        for (variant, result) in futures::future::join_all(pings).await {
            match result {
                Ok(()) => {
                    tracing::info!("Engine for variant '{}' is ready", variant);
                    ready += 1;
                }
                Err(e) => tracing::warn!("Engine for variant '{}' is not reachable: {:#}", variant, e),
            }
        }
        ready
    }

    fn wrap(&self, engine: Arc<dyn Engine>, serialize: bool) -> Arc<dyn Engine> {
        if serialize {
            Arc::new(Serialized {
                inner: engine,
                lock: Arc::clone(&self.generation_lock),
            })
        } else {
            engine
        }
    }
}

/// Engine wrapper that holds the generation lock for the whole call
///
/// For streams, the guard lives inside the returned stream and is released
/// when the stream is dropped.
struct Serialized {
    inner: Arc<dyn Engine>,
    lock: Arc<Mutex<()>>,
}

#[async_trait]
impl Engine for Serialized {
    fn info(&self) -> &EngineInfo {
        self.inner.info()
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion> {
        let _guard = self.lock.lock().await;
        tracing::debug!("Acquired generation lock for '{}'", self.inner.info().variant);
        self.inner.generate(messages).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        tracing::debug!("Acquired generation lock for '{}'", self.inner.info().variant);
        let stream = self.inner.stream(messages).await?;
        Ok(Box::pin(stream.map(move |item| {
            let _held = &guard;
            item
        })))
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Framework;
    use crate::engines::ScriptedEngine;
    use std::time::Duration;

    fn config() -> Config {
        let mut config = Config::default();
        config.variants.insert(
            "tgi".to_string(),
            VariantConfig::new(Framework::Hf, "lexai"),
        );
        config
    }

    #[test]
    fn test_get_unknown_variant() {
        let registry = EngineRegistry::new(&config());
        let err = registry.get("gpt-4").err().unwrap();
        assert!(matches!(
            err.downcast_ref::<LexaiError>(),
            Some(LexaiError::UnknownVariant(v)) if v == "gpt-4"
        ));
    }

    #[test]
    fn test_get_is_cached() {
        let registry = EngineRegistry::new(&config());
        assert!(!registry.is_loaded("baseline"));
        let first = registry.get("baseline").unwrap();
        let second = registry.get("baseline").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_loaded("baseline"));
    }

    #[test]
    fn test_register_overrides() {
        let registry = EngineRegistry::new(&config());
        registry
            .register("baseline", Arc::new(ScriptedEngine::new("baseline")), false)
            .unwrap();
        assert_eq!(registry.get("baseline").unwrap().info().model, "scripted-baseline");
    }

    #[tokio::test]
    async fn test_serialized_engines_do_not_overlap() {
        let registry = EngineRegistry::new(&config());
        let slow = ScriptedEngine::new("a").with_delay(Duration::from_millis(200));
        registry.register("a", Arc::new(slow), true).unwrap();
        registry
            .register("b", Arc::new(ScriptedEngine::new("b")), true)
            .unwrap();

        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();

        let stream_a = a.stream(&[Message::user("q")]).await.unwrap();
        // lock is held while stream_a is alive
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), b.stream(&[Message::user("q")])).await;
        assert!(blocked.is_err());

        drop(stream_a);
        let stream_b =
            tokio::time::timeout(Duration::from_millis(500), b.stream(&[Message::user("q")])).await;
        assert!(stream_b.is_ok());
    }

    #[tokio::test]
    async fn test_unserialized_engines_overlap() {
        let registry = EngineRegistry::new(&config());
        registry
            .register("a", Arc::new(ScriptedEngine::new("a")), false)
            .unwrap();
        registry
            .register("b", Arc::new(ScriptedEngine::new("b")), false)
            .unwrap();
        let _stream_a = registry.get("a").unwrap().stream(&[]).await.unwrap();
        let stream_b = tokio::time::timeout(
            Duration::from_millis(50),
            registry.get("b").unwrap().stream(&[]),
        )
        .await;
        assert!(stream_b.is_ok());
    }

    #[tokio::test]
    async fn test_warm_up_counts_reachable_engines() {
        let mut config = Config::default();
        config.variants.retain(|name, _| name == "baseline" || name == "finetuned");
        let registry = EngineRegistry::new(&config);
        registry
            .register("baseline", Arc::new(ScriptedEngine::new("baseline")), false)
            .unwrap();
        registry
            .register(
                "finetuned",
                Arc::new(ScriptedEngine::new("finetuned").failing_ping("connection refused")),
                false,
            )
            .unwrap();
        assert_eq!(registry.warm_up().await, 1);
    }
}
