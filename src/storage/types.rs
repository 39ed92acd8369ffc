use crate::engines::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored conversation, one JSON file per record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier, also the file stem
    pub id: String,
    /// User-facing title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last written
    pub updated_at: DateTime<Utc>,
    /// Messages in chronological order
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Model that produced the latest reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Listing entry for a stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique identifier
    pub id: String,
    /// User-facing title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last written
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}
