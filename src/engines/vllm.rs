//! vLLM engine
//!
//! Talks to a vLLM OpenAI-compatible server. A fine-tuned variant served
//! as a LoRA module (`--lora-modules name=path`) is addressed by sending
//! the adapter name as the model.

use super::base::{Completion, Message, RawStream};
use super::openai::OpenAiCompatClient;
use super::{http_client, Engine, EngineInfo};
use crate::config::{GenerationConfig, VariantConfig};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Map;

/// vLLM batched-serving engine
///
/// # Examples
///
/// ```
/// use lexai::config::{Framework, GenerationConfig, VariantConfig};
/// use lexai::engines::{Engine, VllmEngine};
///
/// let mut config = VariantConfig::new(Framework::Vllm, "Qwen/Qwen3-1.7B");
/// config.adapter = Some("lexai".to_string());
/// let engine = VllmEngine::new("finetuned", &config, GenerationConfig::default()).unwrap();
/// assert_eq!(engine.info().model, "Qwen/Qwen3-1.7B");
/// ```
pub struct VllmEngine {
    info: EngineInfo,
    client: OpenAiCompatClient,
}

impl VllmEngine {
    /// Create a new vLLM engine
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(variant: &str, config: &VariantConfig, generation: GenerationConfig) -> Result<Self> {
        let served = config.adapter.clone().unwrap_or_else(|| config.model.clone());
        tracing::info!(
            "Initialized vLLM engine: host={}, model={}",
            config.host(),
            served
        );
        let client = OpenAiCompatClient::new(
            http_client(config)?,
            config.host(),
            "vLLM",
            served,
            generation,
            Map::new(),
        );
        Ok(Self {
            info: EngineInfo::from_config(variant, config),
            client,
        })
    }
}

#[async_trait]
impl Engine for VllmEngine {
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
