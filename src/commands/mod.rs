//! Command handlers for LexAI
//!
//! Each subcommand of the CLI maps to a handler here. `serve` runs the
//! HTTP API; `history` and `variants` work directly on the log
//! directory and configuration without starting a server.

pub mod history;
pub mod variants;

pub mod serve {
    use crate::config::Config;
    use crate::error::Result;

    /// Start the HTTP server with the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the server cannot start
    pub async fn run_serve(config: Config) -> Result<()> {
        tracing::info!(
            "Starting LexAI on {}:{} (default variant '{}', {} variants)",
            config.server.host,
            config.server.port,
            config.chat.default_variant,
            config.variants.len()
        );
        tracing::debug!("Conversation logs: {}", config.storage.log_dir.display());
        crate::server::serve(config).await
    }
}
