//! Chat service
//!
//! Validates chat requests, resolves the model variant, runs the engine
//! and records the exchange in the conversation store. Streaming replies
//! are produced by a spawned task and delivered as [`StreamEvent`]s over
//! a bounded channel; dropping the receiver stops generation.

pub mod compare;
pub mod events;

pub use events::{DeltaEvent, ErrorEvent, FinalEvent, FinalUsage, ModelTag, StartEvent, StreamEvent};

use crate::config::{Config, GenerationConfig, COMPARE_VARIANT};
use crate::engines::{
    build_messages, generate_reply, stream_reply, Engine, EngineRegistry, Message, StreamChunk,
    TokenUsage,
};
use crate::error::{LexaiError, Result};
use crate::storage::{
    validate_conversation_id, Conversation, ConversationStore, ConversationSummary,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Body of `POST /chat` and `POST /chat/stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    /// Existing conversation to continue; a new one is created when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// The new user message
    pub message: String,
    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<Message>,
    /// Variant to answer with, or `compare`; defaults to the configured variant
    #[serde(default)]
    pub model_variant: Option<String>,
}

impl ChatRequest {
    /// Create a request with no history or conversation id
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            message: message.into(),
            history: Vec::new(),
            model_variant: None,
        }
    }

    /// Builder-style model variant
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.model_variant = Some(variant.into());
        self
    }

    /// Builder-style conversation id
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Builder-style history
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Check the request before any engine is called
    ///
    /// # Errors
    ///
    /// Returns [`LexaiError::InvalidRequest`] for a blank message, a blank
    /// history entry, or an unusable conversation id
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(LexaiError::InvalidRequest("message must not be empty".to_string()).into());
        }
        if let Some(index) = self.history.iter().position(|m| m.content.trim().is_empty()) {
            return Err(LexaiError::InvalidRequest(format!(
                "history[{}].content must not be empty",
                index
            ))
            .into());
        }
        if let Some(id) = &self.conversation_id {
            validate_conversation_id(id)?;
        }
        Ok(())
    }

    /// Trim surrounding whitespace from the message, then validate
    ///
    /// The trimmed message is what the engine sees and what is stored.
    pub fn normalize(mut self) -> Result<Self> {
        self.message = self.message.trim().to_string();
        self.validate()?;
        Ok(self)
    }
}

/// Body returned by `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub title: String,
    pub reply: String,
    pub disclaimer: String,
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Shared chat entry point used by the HTTP handlers
#[derive(Clone)]
pub struct ChatService {
    config: Arc<Config>,
    registry: Arc<EngineRegistry>,
    store: Arc<ConversationStore>,
}

impl ChatService {
    /// Create a service from its parts
    pub fn new(config: Arc<Config>, registry: Arc<EngineRegistry>, store: Arc<ConversationStore>) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }

    /// Create a service, opening the store and an empty engine registry
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn from_config(config: Config) -> Result<Self> {
        let store = ConversationStore::new(&config.storage.log_dir)?;
        let registry = EngineRegistry::new(&config);
        Ok(Self::new(Arc::new(config), Arc::new(registry), Arc::new(store)))
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine registry
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Conversation store
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Variant named by the request, or the configured default
    pub fn resolve_variant(&self, request: &ChatRequest) -> String {
        request
            .model_variant
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.config.chat.default_variant)
            .to_string()
    }

    fn engine_for(&self, variant: &str) -> Result<Arc<dyn Engine>> {
        self.registry.get(variant)
    }

    fn prompt(&self, request: &ChatRequest) -> Vec<Message> {
        build_messages(
            &self.config.chat.system_prompt,
            &request.history,
            &request.message,
        )
    }

    /// Answer a chat request in one piece
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error for bad input or `compare`, an
    /// unknown-variant error, an engine error if generation fails, or a
    /// storage error if the exchange cannot be saved
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let request = request.normalize()?;
        let variant = self.resolve_variant(&request);
        if variant == COMPARE_VARIANT {
            return Err(LexaiError::InvalidRequest(
                "model_variant 'compare' is only available on /chat/stream".to_string(),
            )
            .into());
        }
        let engine = self.engine_for(&variant)?;
        let model = engine.info().display_name.clone();
        tracing::info!(
            "Chat request: variant={}, history={} messages",
            variant,
            request.history.len()
        );

        let reply = generate_reply(engine.as_ref(), &self.prompt(&request)).await?;

        let record = self
            .persist(&request, reply.text.clone(), Some(model.clone()))
            .await?;

        Ok(ChatResponse {
            conversation_id: record.id,
            title: record.title,
            reply: reply.text,
            disclaimer: self.config.chat.disclaimer.clone(),
            model,
            generation_config: self.config.generation,
            usage: reply.usage,
            thinking: reply.thinking,
        })
    }

    /// Start a streamed reply
    ///
    /// Validation and variant resolution happen before anything is
    /// spawned, so those failures are returned directly. Later failures
    /// arrive as an `error` event, after which the channel closes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request or unknown-variant error
    pub fn stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = request.normalize()?;
        let variant = self.resolve_variant(&request);
        let (tx, rx) = mpsc::channel(self.config.compare.channel_capacity.max(1));

        if variant == COMPARE_VARIANT {
            let lanes = compare::Lane::resolve(self)?;
            tracing::info!("Compare stream request: {}", compare::Lane::label(&lanes));
            tokio::spawn(compare::run(self.clone(), request, lanes, tx));
        } else {
            let engine = self.engine_for(&variant)?;
            tracing::info!("Stream request: variant={}", variant);
            tokio::spawn(self.clone().run_single(request, engine, tx));
        }
        Ok(rx)
    }

    async fn run_single(
        self,
        request: ChatRequest,
        engine: Arc<dyn Engine>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let model = engine.info().display_name.clone();
        let start = StreamEvent::Start(StartEvent {
            model: model.clone(),
            generation_config: self.config.generation,
            variant: None,
            models: None,
        });
        if tx.send(start).await.is_err() {
            return;
        }

        let mut stream = match stream_reply(engine, self.prompt(&request)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start stream: {:#}", e);
                let _ = tx.send(StreamEvent::error(e.to_string(), None)).await;
                return;
            }
        };

        let mut last: Option<StreamChunk> = None;
        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!("Stream failed: {:#}", e);
                    let _ = tx.send(StreamEvent::error(e.to_string(), None)).await;
                    return;
                }
            };
            let event = StreamEvent::Delta(DeltaEvent {
                text: chunk.text.clone(),
                delta: chunk.delta.clone(),
                finished: chunk.finished,
                usage: chunk.usage,
                thinking: chunk.thinking.clone(),
                variant: None,
                models: None,
            });
            if tx.send(event).await.is_err() {
                tracing::info!("Client disconnected; stopping generation");
                return;
            }
            if chunk.finished {
                last = Some(chunk);
            }
        }
        drop(stream);

        let Some(last) = last else {
            let _ = tx
                .send(StreamEvent::error("Stream ended without a final chunk", None))
                .await;
            return;
        };

        let event = match self.persist(&request, last.text.clone(), Some(model.clone())).await {
            Ok(record) => StreamEvent::Final(FinalEvent {
                conversation_id: record.id,
                title: record.title,
                reply: last.text,
                disclaimer: self.config.chat.disclaimer.clone(),
                model,
                generation_config: self.config.generation,
                usage: FinalUsage::Single(last.usage),
                thinking: last.thinking,
                variant: None,
                models: None,
                replies: None,
            }),
            Err(e) => {
                tracing::error!("Failed to save conversation: {:#}", e);
                StreamEvent::error(e.to_string(), None)
            }
        };
        let _ = tx.send(event).await;
    }

    /// Stored conversations, most recently updated first
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.with_store(|store| store.list()).await
    }

    /// Load one conversation
    ///
    /// # Errors
    ///
    /// Returns [`LexaiError::NotFound`] if no record exists for `id`
    pub async fn conversation(&self, id: &str) -> Result<Conversation> {
        let id = id.to_string();
        self.with_store(move |store| {
            store
                .load(&id)?
                .ok_or_else(|| LexaiError::NotFound(id.clone()).into())
        })
        .await
    }

    /// Rename a conversation
    ///
    /// # Errors
    ///
    /// Returns [`LexaiError::InvalidRequest`] for a blank title and
    /// [`LexaiError::NotFound`] if no record exists for `id`
    pub async fn rename(&self, id: &str, title: &str) -> Result<Conversation> {
        let id = id.to_string();
        let title = title.to_string();
        self.with_store(move |store| {
            store
                .rename(&id, &title)?
                .ok_or_else(|| LexaiError::NotFound(id.clone()).into())
        })
        .await
    }

    /// Save an exchange on the blocking pool
    pub(crate) async fn persist(
        &self,
        request: &ChatRequest,
        reply: String,
        model: Option<String>,
    ) -> Result<Conversation> {
        let conversation_id = request.conversation_id.clone();
        let message = request.message.clone();
        let history = request.history.clone();

        self.with_store(move |store| {
            store.save_exchange(
                conversation_id.as_deref(),
                &message,
                &reply,
                &history,
                model.as_deref(),
            )
        })
        .await
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConversationStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| LexaiError::Storage(format!("Storage task failed: {}", e)))?
    }
}
