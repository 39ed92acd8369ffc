//! In-process scripted engine
//!
//! [`ScriptedEngine`] replays a fixed list of text fragments instead of
//! calling an inference server. It lets the chat service, compare mode
//! and HTTP handlers be exercised without a network, and can be told to
//! fail part-way through or to pause between fragments.
//!
//! # Example
//!
//! ```
//! use lexai::engines::{generate_reply, Message, ScriptedEngine};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = ScriptedEngine::new("finetuned").with_fragments(["임대인에게 ", "통지하세요."]);
//! let reply = generate_reply(&engine, &[Message::user("전세 계약 해지 방법은?")]).await.unwrap();
//! assert_eq!(reply.text, "임대인에게 통지하세요.");
//! assert_eq!(engine.calls(), 1);
//! # }
//! ```

use super::base::{Completion, Message, RawEvent, RawStream, TokenUsage};
use super::{Engine, EngineInfo};
use crate::error::{LexaiError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine that replays scripted output
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    info: EngineInfo,
    fragments: Vec<String>,
    usage: Option<TokenUsage>,
    fail_after: Option<(usize, String)>,
    ping_error: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedEngine {
    /// Create an engine for `variant` that replies `"{variant} reply"`
    pub fn new(variant: impl Into<String>) -> Self {
        let variant = variant.into();
        Self {
            info: EngineInfo {
                display_name: variant.clone(),
                model: format!("scripted-{}", variant),
                variant: variant.clone(),
            },
            fragments: vec![format!("{} reply", variant)],
            usage: None,
            fail_after: None,
            ping_error: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.info.display_name = display_name.into();
        self
    }

    /// Replace the scripted fragments
    pub fn with_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = fragments.into_iter().map(Into::into).collect();
        self
    }

    /// Report this usage at the end of every generation
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Fail after `fragments` fragments have been streamed
    ///
    /// Non-streaming generation fails outright.
    pub fn failing_after(mut self, fragments: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((fragments, message.into()));
        self
    }

    /// Make `ping` fail
    pub fn failing_ping(mut self, message: impl Into<String>) -> Self {
        self.ping_error = Some(message.into());
        self
    }

    /// Sleep before producing each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of generate/stream calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages sent with the most recent call
    pub fn last_prompt(&self) -> Option<Vec<Message>> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }

    fn record(&self, messages: &[Message]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion> {
        self.record(messages);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, message)) = &self.fail_after {
            return Err(LexaiError::Engine(message.clone()).into());
        }
        Ok(Completion {
            text: self.fragments.concat(),
            thinking: None,
            usage: self.usage,
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<RawStream> {
        self.record(messages);

        let mut steps: Vec<Result<RawEvent>> = Vec::new();
        for (index, fragment) in self.fragments.iter().enumerate() {
            if let Some((after, message)) = &self.fail_after {
                if index == *after {
                    steps.push(Err(LexaiError::Engine(message.clone()).into()));
                    break;
                }
            }
            steps.push(Ok(RawEvent::Content(fragment.clone())));
        }
        match &self.fail_after {
            Some((after, message)) if *after >= self.fragments.len() => {
                steps.push(Err(LexaiError::Engine(message.clone()).into()));
            }
            None => {
                if let Some(usage) = self.usage {
                    steps.push(Ok(RawEvent::Usage(usage)));
                }
            }
            _ => {}
        }

        let delay = self.delay;
        let stream = futures::stream::unfold(steps.into_iter(), move |mut steps| async move {
            let step = steps.next()?;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Some((step, steps))
        });
        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> Result<()> {
        match &self.ping_error {
            Some(message) => Err(LexaiError::Engine(message.clone()).into()),
            None => Ok(()),
        }
    }
}
