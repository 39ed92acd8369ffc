//! MLX engine
//!
//! Talks to `mlx_lm.server` on Apple silicon. The server speaks the
//! OpenAI chat completions protocol and accepts an `adapters` path per
//! request for LoRA weights.

use super::base::{Completion, Message, RawStream};
use super::openai::OpenAiCompatClient;
use super::{http_client, Engine, EngineInfo};
use crate::config::{GenerationConfig, VariantConfig};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Apple-silicon engine backed by `mlx_lm.server`
pub struct MlxEngine {
    info: EngineInfo,
    client: OpenAiCompatClient,
}

impl MlxEngine {
    /// Create a new MLX engine
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(variant: &str, config: &VariantConfig, generation: GenerationConfig) -> Result<Self> {
        let mut extra = Map::new();
        if let Some(adapter) = &config.adapter {
            extra.insert("adapters".to_string(), Value::String(adapter.clone()));
        }
        let client = OpenAiCompatClient::new(
            http_client(config)?,
            config.host(),
            "MLX",
            config.model.clone(),
            generation,
            extra,
        );
        Ok(Self {
            info: EngineInfo::from_config(variant, config),
            client,
        })
    }
}

#[async_trait]
impl Engine for MlxEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion> {
        self.client.complete(messages).await
    }

    async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        self.client.stream(messages).await
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}
