//! Inference engine abstraction for LexAI
//!
//! This module contains the engine trait that unifies the supported
//! inference servers (vLLM, text-generation-inference, MLX, Ollama)
//! behind one generate/stream interface, plus the helpers that turn raw
//! engine output into user-facing replies and stream chunks.

pub mod base;
pub mod framing;
pub mod hf;
pub mod mlx;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod scripted;
pub mod thinking;
pub mod vllm;

pub use base::{
    build_messages, ChunkStream, Completion, Message, RawEvent, RawStream, Reply, Role,
    StreamChunk, TokenUsage,
};
pub use hf::HfEngine;
pub use mlx::MlxEngine;
pub use ollama::OllamaEngine;
pub use registry::EngineRegistry;
pub use scripted::ScriptedEngine;
pub use vllm::VllmEngine;

use crate::config::{Framework, GenerationConfig, VariantConfig};
use crate::error::{engine_failure, LexaiError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use thinking::{split_thinking, ThinkingFilter};

/// Identity of an engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// Variant key from configuration
    pub variant: String,
    /// Name shown to users
    pub display_name: String,
    /// Model identifier sent to the engine
    pub model: String,
}

impl EngineInfo {
    /// Build from a variant's configuration
    pub fn from_config(variant: &str, config: &VariantConfig) -> Self {
        Self {
            variant: variant.to_string(),
            display_name: config.display_name_or(variant),
            model: config.model.clone(),
        }
    }
}

/// Inference engine trait
///
/// Each implementation wraps one external inference server. Engines
/// return raw output; thinking removal and delta computation happen in
/// [`generate_reply`] and [`stream_reply`].
///
/// # Examples
///
/// ```
/// use lexai::engines::{Completion, Engine, EngineInfo, Message, RawStream};
/// use lexai::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoEngine {
///     info: EngineInfo,
/// }
///
/// #[async_trait]
/// impl Engine for EchoEngine {
///     fn info(&self) -> &EngineInfo {
///         &self.info
///     }
///
///     async fn generate(&self, messages: &[Message]) -> Result<Completion> {
///         let text = messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(Completion { text, ..Default::default() })
///     }
///
///     async fn stream(&self, _messages: &[Message]) -> Result<RawStream> {
///         Ok(Box::pin(futures::stream::empty()))
///     }
/// }
/// ```
#[async_trait]
pub trait Engine: Send + Sync {
    /// Variant name, display name and model
    fn info(&self) -> &EngineInfo;

    /// Produce a complete reply
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unreachable or answers with an error
    async fn generate(&self, messages: &[Message]) -> Result<Completion>;

    /// Start a streamed reply
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started; failures after
    /// that surface as error items in the stream
    async fn stream(&self, messages: &[Message]) -> Result<RawStream>;

    /// Check that the engine is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Create an engine for a configured variant
///
/// # Arguments
///
/// * `variant` - Variant key
/// * `config` - Variant configuration
/// * `generation` - Sampling parameters applied to every request
///
/// # Errors
///
/// Returns a configuration error if the HTTP client cannot be built
pub fn create_engine(
    variant: &str,
    config: &VariantConfig,
    generation: &GenerationConfig,
) -> Result<Arc<dyn Engine>> {
    tracing::info!(
        "Creating {} engine for variant '{}' (model={}, host={})",
        config.framework,
        variant,
        config.model,
        config.host()
    );
    let engine: Arc<dyn Engine> = match config.framework {
        Framework::Vllm => Arc::new(VllmEngine::new(variant, config, *generation)?),
        Framework::Hf => Arc::new(HfEngine::new(variant, config, *generation)?),
        Framework::Mlx => Arc::new(MlxEngine::new(variant, config, *generation)?),
        Framework::Ollama => Arc::new(OllamaEngine::new(variant, config, *generation)?),
    };
    Ok(engine)
}

/// Run a non-streaming generation and clean up the result
///
/// Thinking spans are removed and the visible text is trimmed. Any
/// failure is reported as an engine error.
pub async fn generate_reply(engine: &dyn Engine, messages: &[Message]) -> Result<Reply> {
    let completion = engine.generate(messages).await.map_err(engine_failure)?;
    let split = split_thinking(&completion.text);
    let segments: Vec<&str> = [completion.thinking.as_deref(), split.thinking.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let thinking = (!segments.is_empty()).then(|| segments.join("\n\n"));
    Ok(Reply {
        text: split.visible.trim().to_string(),
        thinking,
        usage: completion.usage,
    })
}

enum StreamState {
    Running {
        raw: RawStream,
        filter: ThinkingFilter,
        usage: Option<TokenUsage>,
    },
    Done,
}

/// Start a streamed generation and convert it to user-facing chunks
///
/// The returned stream ends with exactly one `finished` chunk carrying
/// usage, or stops right after the first error item.
pub async fn stream_reply(engine: Arc<dyn Engine>, messages: Vec<Message>) -> Result<ChunkStream> {
    let raw = engine.stream(&messages).await.map_err(engine_failure)?;
    let variant = engine.info().variant.clone();
    let state = StreamState::Running {
        raw,
        filter: ThinkingFilter::new(),
        usage: None,
    };

    Ok(Box::pin(futures::stream::unfold(state, move |state| {
        let variant = variant.clone();
        async move {
            let StreamState::Running {
                mut raw,
                mut filter,
                mut usage,
            } = state
            else {
                return None;
            };

            loop {
                match raw.next().await {
                    Some(Ok(RawEvent::Content(text))) => {
                        if let Some(chunk) = filter.push_content(&text) {
                            let state = StreamState::Running { raw, filter, usage };
                            return Some((Ok(chunk), state));
                        }
                    }
                    Some(Ok(RawEvent::Thinking(text))) => {
                        if let Some(chunk) = filter.push_thinking(&text) {
                            let state = StreamState::Running { raw, filter, usage };
                            return Some((Ok(chunk), state));
                        }
                    }
                    Some(Ok(RawEvent::Usage(reported))) => usage = Some(reported),
                    Some(Err(e)) => {
                        tracing::warn!("Stream for variant '{}' failed: {:#}", variant, e);
                        return Some((Err(engine_failure(e)), StreamState::Done));
                    }
                    None => {
                        let last = filter.finish(usage);
                        tracing::debug!(
                            "Stream for variant '{}' finished: {} chars, usage={:?}",
                            variant,
                            last.text.chars().count(),
                            last.usage
                        );
                        return Some((Ok(last), StreamState::Done));
                    }
                }
            }
        }
    })))
}

/// Build the HTTP client used by an engine
pub(crate) fn http_client(config: &VariantConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .user_agent(concat!("lexai/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LexaiError::Config(format!("Failed to create HTTP client: {}", e)).into())
}

/// Send a request and turn transport failures and non-2xx statuses into engine errors
pub(crate) async fn send_checked(label: &str, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        tracing::error!("{} request failed: {}", label, e);
        LexaiError::Engine(format!("{} request failed: {}", label, e))
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!("{} returned error {}: {}", label, status, error_text);
        return Err(LexaiError::Engine(format!(
            "{} returned error {}: {}",
            label, status, error_text
        ))
        .into());
    }

    Ok(response)
}

/// Parse a JSON payload from an engine, reporting failures as engine errors
pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(label: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| {
        tracing::error!("Failed to parse {} payload: {} ({})", label, e, payload);
        LexaiError::Engine(format!("Failed to parse {} response: {}", label, e)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::scripted::ScriptedEngine;

    #[test]
    fn test_create_engine_for_each_framework() {
        let generation = GenerationConfig::default();
        for framework in [
            Framework::Vllm,
            Framework::Hf,
            Framework::Mlx,
            Framework::Ollama,
        ] {
            let config = VariantConfig::new(framework, "qwen3").with_display_name("Qwen");
            let engine = create_engine("baseline", &config, &generation).unwrap();
            assert_eq!(engine.info().variant, "baseline");
            assert_eq!(engine.info().display_name, "Qwen");
        }
    }

    #[tokio::test]
    async fn test_generate_reply_strips_and_trims() {
        let engine = ScriptedEngine::new("finetuned")
            .with_fragments(["<think>검토</think>", "\n\n계약을 해지할 수 있습니다. "]);
        let reply = generate_reply(&engine, &[Message::user("q")]).await.unwrap();
        assert_eq!(reply.text, "계약을 해지할 수 있습니다.");
        assert_eq!(reply.thinking.as_deref(), Some("검토"));
    }

    #[tokio::test]
    async fn test_generate_reply_wraps_errors_as_engine_errors() {
        let engine = ScriptedEngine::new("finetuned").failing_after(0, "boom");
        let err = generate_reply(&engine, &[Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LexaiError>(),
            Some(LexaiError::Engine(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_reply_single_finished_chunk_with_usage() {
        let engine: Arc<dyn Engine> = Arc::new(
            ScriptedEngine::new("baseline").with_fragments(["전세 ", "계약", "<think>x</think>"]),
        );
        let chunks: Vec<StreamChunk> = stream_reply(engine, vec![Message::user("q")])
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let finished: Vec<_> = chunks.iter().filter(|c| c.finished).collect();
        assert_eq!(finished.len(), 1);
        let last = chunks.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.text, "전세 계약");
        let usage = last.usage.unwrap();
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
        assert_eq!(usage.completion_tokens, 3);
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.usage.is_none()));

        let joined: String = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(joined, "전세 계약");
    }

    #[tokio::test]
    async fn test_stream_reply_prefers_reported_usage() {
        let engine: Arc<dyn Engine> = Arc::new(
            ScriptedEngine::new("baseline")
                .with_fragments(["a", "b"])
                .with_usage(TokenUsage::new(20, 2)),
        );
        let chunks: Vec<_> = stream_reply(engine, vec![Message::user("q")])
            .await
            .unwrap()
            .collect()
            .await;
        let last = chunks.last().unwrap().as_ref().unwrap();
        assert_eq!(last.usage, Some(TokenUsage::new(20, 2)));
    }

    #[tokio::test]
    async fn test_stream_reply_stops_after_error() {
        let engine: Arc<dyn Engine> = Arc::new(
            ScriptedEngine::new("baseline")
                .with_fragments(["a", "b", "c"])
                .failing_after(1, "connection reset"),
        );
        let items: Vec<_> = stream_reply(engine, vec![Message::user("q")])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(items
            .iter()
            .filter_map(|i| i.as_ref().ok())
            .all(|c| !c.finished));
    }
}
