//! Server-sent event payloads for streamed chat
//!
//! Every event serializes to one JSON object with a `type` field of
//! `start`, `delta`, `final` or `error`. Compare-mode events carry the
//! originating `variant` and the `models` taking part.

use crate::config::GenerationConfig;
use crate::engines::TokenUsage;
use serde::Serialize;
use std::collections::BTreeMap;

/// A variant taking part in a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelTag {
    /// Variant key
    pub variant: String,
    /// Display name
    pub model: String,
}

/// Usage reported in a `final` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FinalUsage {
    /// Single-variant usage
    Single(Option<TokenUsage>),
    /// Compare-mode usage keyed by variant
    PerVariant(BTreeMap<String, Option<TokenUsage>>),
}

/// One event of a streamed chat
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Generation is about to start
    Start(StartEvent),
    /// New text from one variant
    Delta(DeltaEvent),
    /// Generation finished and the conversation was saved
    Final(FinalEvent),
    /// Generation failed; nothing was saved
    Error(ErrorEvent),
}

/// Payload of a `start` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartEvent {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelTag>>,
}

/// Payload of a `delta` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaEvent {
    pub text: String,
    pub delta: String,
    pub finished: bool,
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelTag>>,
}

/// Payload of a `final` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalEvent {
    pub conversation_id: String,
    pub title: String,
    pub reply: String,
    pub disclaimer: String,
    pub model: String,
    pub generation_config: GenerationConfig,
    pub usage: FinalUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelTag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<BTreeMap<String, String>>,
}

/// Payload of an `error` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl StreamEvent {
    /// Build an error event
    pub fn error(message: impl Into<String>, variant: Option<String>) -> Self {
        Self::Error(ErrorEvent {
            message: message.into(),
            variant,
        })
    }

    /// Serialize to the JSON carried in an SSE `data:` line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream event: {}", e);
            serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(event: &StreamEvent) -> Value {
        serde_json::from_str(&event.to_json()).unwrap()
    }

    #[test]
    fn test_start_event_shape() {
        let event = StreamEvent::Start(StartEvent {
            model: "LexAI".to_string(),
            generation_config: GenerationConfig::default(),
            variant: None,
            models: None,
        });
        let json = parse(&event);
        assert_eq!(json["type"], "start");
        assert_eq!(json["model"], "LexAI");
        assert_eq!(json["generation_config"]["max_new_tokens"], 8192);
        assert!(json.get("models").is_none());
    }

    #[test]
    fn test_delta_event_keeps_null_usage() {
        let event = StreamEvent::Delta(DeltaEvent {
            text: "전세".to_string(),
            delta: "전세".to_string(),
            finished: false,
            usage: None,
            thinking: None,
            variant: Some("baseline".to_string()),
            models: None,
        });
        let json = parse(&event);
        assert_eq!(json["type"], "delta");
        assert!(json["usage"].is_null());
        assert_eq!(json["variant"], "baseline");
        assert!(json.get("thinking").is_none());
    }

    #[test]
    fn test_final_usage_per_variant_is_a_map() {
        let mut usage = BTreeMap::new();
        usage.insert("baseline".to_string(), Some(TokenUsage::new(1, 2)));
        let event = StreamEvent::Final(FinalEvent {
            conversation_id: "abc".to_string(),
            title: "t".to_string(),
            reply: "r".to_string(),
            disclaimer: "d".to_string(),
            model: "A vs B".to_string(),
            generation_config: GenerationConfig::default(),
            usage: FinalUsage::PerVariant(usage),
            thinking: None,
            variant: Some("compare".to_string()),
            models: None,
            replies: None,
        });
        let json = parse(&event);
        assert_eq!(json["usage"]["baseline"]["total_tokens"], 3);
    }

    #[test]
    fn test_error_event() {
        let json = parse(&StreamEvent::error("boom", None));
        assert_eq!(json, serde_json::json!({"type": "error", "message": "boom"}));
    }
}
