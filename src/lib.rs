//! LexAI - legal chatbot backend library
//!
//! This library provides the core functionality for the LexAI backend:
//! chat requests proxied to locally hosted inference engines, streamed
//! replies with reasoning text removed, side-by-side comparison of two
//! model variants, and a JSON log of every conversation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `engines`: Inference engine abstraction (vLLM, TGI, MLX, Ollama) and the engine registry
//! - `chat`: Chat service, streamed events and compare mode
//! - `storage`: File-backed conversation store
//! - `server`: HTTP API (axum)
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use lexai::{ChatRequest, ChatService, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let service = ChatService::from_config(config)?;
//!     let response = service.chat(ChatRequest::new("전세 계약 해지 방법은?")).await?;
//!     println!("{}", response.reply);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engines;
pub mod error;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use chat::{ChatRequest, ChatResponse, ChatService, StreamEvent};
pub use config::Config;
pub use engines::{Engine, EngineRegistry};
pub use error::{LexaiError, Result};
pub use storage::ConversationStore;

#[cfg(test)]
pub mod test_utils;
