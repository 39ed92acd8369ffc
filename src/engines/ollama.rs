//! Ollama engine implementation for LexAI
//!
//! This module implements the Engine trait for Ollama, connecting to a
//! local or remote Ollama daemon through `/api/chat`. Streaming replies
//! arrive as newline-delimited JSON; Qwen3 reasoning is reported in a
//! separate `thinking` field by recent Ollama releases.

use super::base::{Completion, Message, RawEvent, RawStream, TokenUsage};
use super::framing::ndjson_frames;
use super::{http_client, parse_payload, send_checked, Engine, EngineInfo};
use crate::config::{GenerationConfig, VariantConfig};
use crate::error::{LexaiError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama engine
///
/// # Examples
///
/// ```no_run
/// use lexai::config::{Framework, GenerationConfig, VariantConfig};
/// use lexai::engines::{generate_reply, Message, OllamaEngine};
///
/// # async fn example() -> lexai::error::Result<()> {
/// let config = VariantConfig::new(Framework::Ollama, "qwen3:1.7b");
/// let engine = OllamaEngine::new("baseline", &config, GenerationConfig::default())?;
/// let reply = generate_reply(&engine, &[Message::user("안녕하세요")]).await?;
/// println!("{}", reply.text);
/// # Ok(())
/// # }
/// ```
pub struct OllamaEngine {
    info: EngineInfo,
    client: Client,
    host: String,
    generation: GenerationConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

/// Sampling options for Ollama API
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

/// Message structure in Ollama responses
#[derive(Debug, Default, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

/// Response structure from Ollama API (one per line when streaming)
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaResponse {
    fn usage(&self) -> Option<TokenUsage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        Some(TokenUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        ))
    }
}

impl OllamaEngine {
    /// Create a new Ollama engine instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(variant: &str, config: &VariantConfig, generation: GenerationConfig) -> Result<Self> {
        let client = http_client(config)?;

        tracing::info!(
            "Initialized Ollama engine: host={}, model={}",
            config.host(),
            config.model
        );

        Ok(Self {
            info: EngineInfo::from_config(variant, config),
            client,
            host: config.host(),
            generation,
        })
    }

    fn request<'a>(&'a self, messages: &'a [Message], stream: bool) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.info.model,
            messages,
            stream,
            options: OllamaOptions {
                temperature: self.generation.temperature,
                top_p: self.generation.top_p,
                num_predict: self.generation.max_new_tokens,
            },
        }
    }
}

fn parse_stream_line(frame: Result<String>) -> Vec<Result<RawEvent>> {
    let line = match frame {
        Ok(line) => line,
        Err(e) => return vec![Err(e)],
    };
    let response: OllamaResponse = match parse_payload("Ollama", &line) {
        Ok(response) => response,
        Err(e) => return vec![Err(e)],
    };
    if let Some(error) = &response.error {
        tracing::error!("Ollama stream reported error: {}", error);
        return vec![Err(LexaiError::Engine(format!("Ollama: {}", error)).into())];
    }

    let mut events = Vec::new();
    let usage = if response.done { response.usage() } else { None };
    if let Some(message) = response.message {
        if let Some(thinking) = message.thinking.filter(|t| !t.is_empty()) {
            events.push(Ok(RawEvent::Thinking(thinking)));
        }
        if !message.content.is_empty() {
            events.push(Ok(RawEvent::Content(message.content)));
        }
    }
    if let Some(usage) = usage {
        events.push(Ok(RawEvent::Usage(usage)));
    }
    events
}

#[async_trait]
impl Engine for OllamaEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion> {
        let url = format!("{}/api/chat", self.host);
        tracing::debug!("Sending Ollama request: {} messages", messages.len());

        let request = self.client.post(url).json(&self.request(messages, false));
        let response = send_checked("Ollama", request).await?;

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            LexaiError::Engine(format!("Failed to parse Ollama response: {}", e))
        })?;

        if let Some(error) = ollama_response.error.clone() {
            return Err(LexaiError::Engine(format!("Ollama: {}", error)).into());
        }

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={:?}, completion_tokens={:?}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        let usage = ollama_response.usage();
        let message = ollama_response.message.unwrap_or_default();
        Ok(Completion {
            text: message.content,
            thinking: message.thinking.filter(|t| !t.trim().is_empty()),
            usage,
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        let url = format!("{}/api/chat", self.host);
        tracing::debug!("Starting Ollama stream: {} messages", messages.len());

        let request = self.client.post(url).json(&self.request(messages, true));
        let response = send_checked("Ollama", request).await?;

        let events =
            ndjson_frames(response).flat_map(|line| futures::stream::iter(parse_stream_line(line)));
        Ok(Box::pin(events))
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.host);
        tracing::debug!("Pinging Ollama: {}", url);
        send_checked("Ollama", self.client.get(url)).await?;
        Ok(())
    }
}
