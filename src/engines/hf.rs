//! Hugging Face text-generation-inference engine
//!
//! Uses TGI's native `/generate` and `/generate_stream` endpoints. The
//! chat is rendered into a ChatML prompt (the Qwen chat template) before
//! sending, since the native API takes raw text.

use super::base::{Completion, Message, RawEvent, RawStream, TokenUsage};
use super::framing::sse_frames;
use super::{http_client, parse_payload, send_checked, Engine, EngineInfo};
use crate::config::{GenerationConfig, VariantConfig};
use crate::error::{LexaiError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const IM_START: &str = "<|im_start|>";
const IM_END: &str = "<|im_end|>";

/// Render messages with the ChatML template, ending with an open assistant turn
///
/// # Examples
///
/// ```
/// use lexai::engines::hf::render_chatml;
/// use lexai::engines::Message;
///
/// let prompt = render_chatml(&[Message::user("hi")]);
/// assert_eq!(prompt, "<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n");
/// ```
pub fn render_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(IM_START);
        prompt.push_str(message.role.as_str());
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push_str(IM_END);
        prompt.push('\n');
    }
    prompt.push_str(IM_START);
    prompt.push_str("assistant\n");
    prompt
}

/// Text-generation-inference engine
pub struct HfEngine {
    info: EngineInfo,
    client: Client,
    base_url: String,
    generation: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    inputs: String,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stop: Vec<String>,
    details: bool,
    decoder_input_details: bool,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
    #[serde(default)]
    details: Option<GenerateDetails>,
}

#[derive(Debug, Deserialize)]
struct GenerateDetails {
    #[serde(default)]
    generated_tokens: usize,
    #[serde(default)]
    prefill: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    token: Option<StreamToken>,
    #[serde(default)]
    details: Option<StreamDetails>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamToken {
    #[serde(default)]
    text: String,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, Deserialize)]
struct StreamDetails {
    #[serde(default)]
    generated_tokens: usize,
    #[serde(default)]
    input_length: usize,
}

impl HfEngine {
    /// Create a new TGI engine
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(variant: &str, config: &VariantConfig, generation: GenerationConfig) -> Result<Self> {
        Ok(Self {
            info: EngineInfo::from_config(variant, config),
            client: http_client(config)?,
            base_url: config.host(),
            generation,
        })
    }

    fn request(&self, messages: &[Message], stream: bool) -> GenerateRequest {
        let sampling = self.generation.do_sample();
        GenerateRequest {
            inputs: render_chatml(messages),
            parameters: GenerateParameters {
                max_new_tokens: self.generation.max_new_tokens,
                do_sample: sampling,
                temperature: sampling.then_some(self.generation.temperature),
                top_p: (sampling && self.generation.top_p < 1.0).then_some(self.generation.top_p),
                stop: vec![IM_END.to_string()],
                details: true,
                decoder_input_details: !stream,
                return_full_text: false,
            },
        }
    }
}

fn clean_generated(text: &str) -> String {
    text.strip_suffix(IM_END).unwrap_or(text).to_string()
}

fn parse_stream_frame(frame: Result<String>) -> Vec<Result<RawEvent>> {
    let data = match frame {
        Ok(data) => data,
        Err(e) => return vec![Err(e)],
    };
    let payload: StreamResponse = match parse_payload("TGI", &data) {
        Ok(payload) => payload,
        Err(e) => return vec![Err(e)],
    };
    if let Some(error) = payload.error {
        tracing::error!("TGI stream reported error: {}", error);
        return vec![Err(LexaiError::Engine(format!("TGI: {}", error)).into())];
    }

    let mut events = Vec::new();
    if let Some(token) = payload.token {
        if !token.special && !token.text.is_empty() {
            events.push(Ok(RawEvent::Content(token.text)));
        }
    }
    if let Some(details) = payload.details {
        events.push(Ok(RawEvent::Usage(TokenUsage::new(
            details.input_length,
            details.generated_tokens,
        ))));
    }
    events
}

#[async_trait]
impl Engine for HfEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion> {
        let url = format!("{}/generate", self.base_url);
        tracing::debug!("Sending TGI request: {} messages", messages.len());
        let request = self.client.post(url).json(&self.request(messages, false));
        let response = send_checked("TGI", request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LexaiError::Engine(format!("Failed to read TGI response: {}", e)))?;
        let parsed: GenerateResponse = parse_payload("TGI", &body)?;

        let usage = parsed
            .details
            .map(|d| TokenUsage::new(d.prefill.len(), d.generated_tokens));
        Ok(Completion {
            text: clean_generated(&parsed.generated_text),
            thinking: None,
            usage,
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        let url = format!("{}/generate_stream", self.base_url);
        tracing::debug!("Starting TGI stream: {} messages", messages.len());
        let request = self.client.post(url).json(&self.request(messages, true));
        let response = send_checked("TGI", request).await?;

        let events = sse_frames(response)
            .flat_map(|frame| futures::stream::iter(parse_stream_frame(frame)));
        Ok(Box::pin(events))
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        send_checked("TGI", self.client.get(url)).await?;
        Ok(())
    }
}
