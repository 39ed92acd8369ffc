//! Conversation log storage
//!
//! Each conversation is a pretty-printed JSON file named `{id}.json`
//! under the configured log directory. Writes go through a temporary
//! file and a rename, so readers never see a half-written record.
//! Concurrent updates to the same conversation are last-write-wins.

pub mod types;

pub use types::{Conversation, ConversationSummary};

use crate::engines::Message;
use crate::error::{LexaiError, Result};
use anyhow::Context;
use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Title used when the first message yields nothing usable
pub const DEFAULT_TITLE: &str = "New chat";

/// Maximum number of characters taken from a message for its default title
const TITLE_MAX_CHARS: usize = 40;

/// Mint a new conversation identifier (32 lowercase hex characters)
pub fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Derive a title from a message: its first non-blank line, truncated
///
/// # Examples
///
/// ```
/// use lexai::storage::default_title;
///
/// assert_eq!(default_title("  전세 계약 해지 방법은?\n자세히"), "전세 계약 해지 방법은?");
/// assert_eq!(default_title("   "), "New chat");
/// ```
pub fn default_title(message: &str) -> String {
    let snippet: String = message
        .trim()
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();
    if snippet.trim().is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        snippet
    }
}

/// Allowed conversation ids: they name files in the log directory
const ID_PATTERN: &str = r"^[A-Za-z0-9_-]{1,128}$";

fn id_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let compiled = Regex::new(ID_PATTERN)
        .map_err(|e| LexaiError::Config(format!("Invalid conversation id pattern: {}", e)))?;
    Ok(PATTERN.get_or_init(|| compiled))
}

/// Check that a conversation id is safe to use as a file name
///
/// # Errors
///
/// Returns [`LexaiError::InvalidRequest`] for ids with characters other
/// than ASCII alphanumerics, `-` and `_`, or longer than 128 characters
pub fn validate_conversation_id(id: &str) -> Result<()> {
    if id_pattern()?.is_match(id) {
        Ok(())
    } else {
        Err(LexaiError::InvalidRequest(format!("Invalid conversation id: {:?}", id)).into())
    }
}

/// File-backed conversation store
#[derive(Debug, Clone)]
pub struct ConversationStore {
    log_dir: PathBuf,
}

impl ConversationStore {
    /// Open a store, creating the log directory if needed
    ///
    /// # Examples
    ///
    /// ```
    /// use lexai::storage::ConversationStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = ConversationStore::new(dir.path().join("chat_logs")).unwrap();
    /// assert!(store.list().unwrap().is_empty());
    /// ```
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))
            .map_err(|e| LexaiError::Storage(format!("{:#}", e)))?;
        tracing::debug!("Conversation logs stored in {}", log_dir.display());
        Ok(Self { log_dir })
    }

    /// Directory holding the conversation files
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        validate_conversation_id(id)?;
        Ok(self.log_dir.join(format!("{}.json", id)))
    }

    /// List conversations, most recently updated first
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn list(&self) -> Result<Vec<ConversationSummary>> {
        let entries = std::fs::read_dir(&self.log_dir)
            .with_context(|| format!("Failed to read {}", self.log_dir.display()))
            .map_err(|e| LexaiError::Storage(format!("{:#}", e)))?;

        let mut conversations = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => conversations.push(ConversationSummary::from(&record)),
                Err(e) => tracing::warn!("Skipping unreadable conversation log: {:#}", e),
            }
        }

        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// Load a conversation by id
    ///
    /// Returns `Ok(None)` if no such conversation exists.
    pub fn load(&self, id: &str) -> Result<Option<Conversation>> {
        let path = self.path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path)
            .map(Some)
            .map_err(|e| LexaiError::Storage(format!("{:#}", e)).into())
    }

    /// Record a completed user/assistant exchange
    ///
    /// Without a `conversation_id` a new conversation is created from
    /// `history` plus the exchange. With an id, the exchange is appended
    /// to the stored messages; `history` only seeds a record that does
    /// not exist yet or has no messages.
    ///
    /// # Returns
    ///
    /// Returns the record as written
    pub fn save_exchange(
        &self,
        conversation_id: Option<&str>,
        user_message: &str,
        assistant_message: &str,
        history: &[Message],
        model: Option<&str>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let existing = match conversation_id {
            Some(id) => self.load(id)?,
            None => None,
        };

        let mut record = match existing {
            Some(record) => record,
            None => Conversation {
                id: conversation_id
                    .map(str::to_string)
                    .unwrap_or_else(new_conversation_id),
                title: String::new(),
                created_at: now,
                updated_at: now,
                messages: Vec::new(),
                model: None,
            },
        };

        if record.messages.is_empty() {
            record.messages = history.to_vec();
        }
        record.messages.push(Message::user(user_message));
        record.messages.push(Message::assistant(assistant_message));

        if record.title.trim().is_empty() {
            let first_user = record
                .messages
                .iter()
                .find(|m| m.role == crate::engines::Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or(user_message);
            record.title = default_title(first_user);
        }
        if let Some(model) = model {
            record.model = Some(model.to_string());
        }
        record.updated_at = now;

        self.write(&record)?;
        tracing::info!(
            "Saved conversation {} ({} messages)",
            record.id,
            record.messages.len()
        );
        Ok(record)
    }

    /// Rename a conversation
    ///
    /// Returns `Ok(None)` if the conversation does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LexaiError::InvalidRequest`] for a blank title
    pub fn rename(&self, id: &str, title: &str) -> Result<Option<Conversation>> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LexaiError::InvalidRequest("Title must not be empty.".to_string()).into());
        }
        let Some(mut record) = self.load(id)? else {
            return Ok(None);
        };
        record.title = title.to_string();
        record.updated_at = Utc::now();
        self.write(&record)?;
        tracing::info!("Renamed conversation {} to {:?}", id, title);
        Ok(Some(record))
    }

    fn write(&self, record: &Conversation) -> Result<()> {
        let path = self.path(&record.id)?;
        // one temp file per write so concurrent saves never share it
        let tmp = self.log_dir.join(format!(
            "{}.{}.json.tmp",
            record.id,
            uuid::Uuid::new_v4().simple()
        ));
        let json = serde_json::to_string_pretty(record).map_err(LexaiError::from)?;

        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))
            .and_then(|_| {
                std::fs::rename(&tmp, &path)
                    .with_context(|| format!("Failed to replace {}", path.display()))
            })
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                LexaiError::Storage(format!("{:#}", e))
            })?;
        Ok(())
    }
}

fn read_record(path: &Path) -> anyhow::Result<Conversation> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
