//! OpenAI-compatible chat completions client
//!
//! Shared by the vLLM and MLX engines, which both expose
//! `POST /v1/chat/completions` with SSE streaming.

use super::base::{Completion, Message, RawEvent, RawStream, TokenUsage};
use super::framing::sse_frames;
use super::{parse_payload, send_checked};
use crate::config::GenerationConfig;
use crate::error::{LexaiError, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal SSE payload sent by OpenAI-compatible servers
const DONE_MARKER: &str = "[DONE]";

/// Client for an OpenAI-compatible server
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    label: &'static str,
    model: String,
    generation: GenerationConfig,
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<ChoiceMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl From<UsagePayload> for TokenUsage {
    fn from(usage: UsagePayload) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
    #[serde(default)]
    error: Option<Value>,
}

fn error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

impl OpenAiCompatClient {
    /// Create a client
    ///
    /// `extra` is merged into every request body (e.g. MLX `adapters`).
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        label: &'static str,
        model: impl Into<String>,
        generation: GenerationConfig,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            label,
            model: model.into(),
            generation,
            extra,
        }
    }

    fn request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.generation.max_new_tokens,
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            extra: &self.extra,
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Non-streaming chat completion
    pub async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        tracing::debug!(
            "Sending {} request: model={}, {} messages",
            self.label,
            self.model,
            messages.len()
        );
        let request = self.client.post(self.url()).json(&self.request(messages, false));
        let response = send_checked(self.label, request).await?;
        let body = response.text().await.map_err(|e| {
            LexaiError::Engine(format!("Failed to read {} response: {}", self.label, e))
        })?;
        let parsed: ChatCompletionResponse = parse_payload(self.label, &body)?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| {
                LexaiError::Engine(format!("{} response contained no choices", self.label))
            })?;

        Ok(Completion {
            text: message.content.unwrap_or_default(),
            thinking: message.reasoning_content,
            usage: parsed.usage.map(TokenUsage::from),
        })
    }

    /// Streaming chat completion
    pub async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        tracing::debug!(
            "Starting {} stream: model={}, {} messages",
            self.label,
            self.model,
            messages.len()
        );
        let request = self.client.post(self.url()).json(&self.request(messages, true));
        let response = send_checked(self.label, request).await?;
        let label = self.label;

        let events = sse_frames(response)
            .take_while(|frame| {
                let done = matches!(frame, Ok(data) if data.trim() == DONE_MARKER);
                futures::future::ready(!done)
            })
            .flat_map(move |frame| futures::stream::iter(parse_stream_frame(label, frame)));

        Ok(Box::pin(events))
    }

    /// `GET /v1/models`
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        send_checked(self.label, self.client.get(url)).await?;
        Ok(())
    }
}

fn parse_stream_frame(label: &str, frame: Result<String>) -> Vec<Result<RawEvent>> {
    let data = match frame {
        Ok(data) => data,
        Err(e) => return vec![Err(e)],
    };
    let payload: StreamPayload = match parse_payload(label, &data) {
        Ok(payload) => payload,
        Err(e) => return vec![Err(e)],
    };
    if let Some(error) = payload.error {
        let message = error_message(&error);
        tracing::error!("{} stream reported error: {}", label, message);
        return vec![Err(LexaiError::Engine(format!("{}: {}", label, message)).into())];
    }

    let mut events = Vec::new();
    for choice in payload.choices {
        let delta = choice.delta.unwrap_or_default();
        if let Some(thinking) = delta.reasoning_content.filter(|t| !t.is_empty()) {
            events.push(Ok(RawEvent::Thinking(thinking)));
        }
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            events.push(Ok(RawEvent::Content(content)));
        }
    }
    if let Some(usage) = payload.usage {
        events.push(Ok(RawEvent::Usage(usage.into())));
    }
    events
}
