//! HTTP handlers

use super::error::ApiError;
use super::AppState;
use crate::chat::{ChatRequest, ChatResponse};
use crate::config::Framework;
use crate::storage::{Conversation, ConversationSummary};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

/// Literal payload that ends every event stream
pub const DONE_MARKER: &str = "[DONE]";

/// One entry of `GET /models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantEntry {
    pub variant: String,
    pub model: String,
    pub framework: Framework,
}

/// Body of `GET /models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub default_variant: String,
    pub variants: Vec<VariantEntry>,
    pub compare: Vec<String>,
}

/// Body of `POST /conversations/{id}/title`
#[derive(Debug, Clone, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub title: String,
}

/// Body returned after a rename
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameResponse {
    pub status: String,
    pub conversation: Conversation,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let config = state.chat.config();
    let variants = config
        .variants
        .iter()
        .map(|(name, variant)| VariantEntry {
            variant: name.clone(),
            model: variant.display_name_or(name),
            framework: variant.framework,
        })
        .collect();
    Json(ModelsResponse {
        default_variant: config.chat.default_variant.clone(),
        variants,
        compare: config.compare.variants.clone(),
    })
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    Ok(Json(state.chat.chat(request).await?))
}

/// Stream a reply as server-sent events
///
/// Each event is `data: {json}`; the stream always ends with
/// `data: [DONE]`, after an error event too.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let rx = state.chat.stream(request)?;

    let events = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())))
        .chain(futures::stream::once(async {
            Ok::<_, Infallible>(Event::default().data(DONE_MARKER))
        }));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.chat.conversations().await?))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.chat.conversation(&id).await?))
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let conversation = state.chat.rename(&id, &body.title).await?;
    Ok(Json(RenameResponse {
        status: "ok".to_string(),
        conversation,
    }))
}
