//! Command-line interface definition for LexAI
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving the HTTP API and inspecting
//! stored conversation logs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LexAI - legal chatbot backend
///
/// Proxies chat requests to locally hosted inference engines and keeps
/// a JSON log of every conversation.
#[derive(Parser, Debug, Clone)]
#[command(name = "lexai")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for LexAI
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Interface to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Conversation log directory (overrides storage.log_dir)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Skip constructing and pinging engines at startup
        #[arg(long)]
        no_warm_up: bool,
    },

    /// Inspect stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// List configured model variants
    Variants,
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List conversations, most recently updated first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show every message of a conversation
    Show {
        /// Conversation id
        id: String,
    },

    /// Rename a conversation
    Rename {
        /// Conversation id
        id: String,

        /// New title
        title: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            command: Commands::Variants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Variants));
    }

    #[test]
    fn test_cli_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["lexai", "serve"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        if let Commands::Serve {
            host,
            port,
            log_dir,
            no_warm_up,
        } = cli.command
        {
            assert_eq!(host, None);
            assert_eq!(port, None);
            assert_eq!(log_dir, None);
            assert!(!no_warm_up);
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "lexai",
            "serve",
            "--host",
            "127.0.0.1",
            "-p",
            "8088",
            "--log-dir",
            "/var/lib/lexai",
            "--no-warm-up",
        ])
        .unwrap();
        if let Commands::Serve {
            host,
            port,
            log_dir,
            no_warm_up,
        } = cli.command
        {
            assert_eq!(host.as_deref(), Some("127.0.0.1"));
            assert_eq!(port, Some(8088));
            assert_eq!(log_dir, Some(PathBuf::from("/var/lib/lexai")));
            assert!(no_warm_up);
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_parse_serve_rejects_bad_port() {
        let cli = Cli::try_parse_from(["lexai", "serve", "--port", "99999"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_history_list_json() {
        let cli = Cli::try_parse_from(["lexai", "history", "list", "--json"]).unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::List { json },
            } => assert!(json),
            other => panic!("Expected history list, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_history_rename() {
        let cli =
            Cli::try_parse_from(["lexai", "history", "rename", "abc123", "전세 계약"]).unwrap();
        match cli.command {
            Commands::History {
                command: HistoryCommand::Rename { id, title },
            } => {
                assert_eq!(id, "abc123");
                assert_eq!(title, "전세 계약");
            }
            other => panic!("Expected history rename, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_custom_config_and_verbose() {
        let cli = Cli::try_parse_from(["lexai", "-v", "--config", "/etc/lexai.yaml", "variants"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/etc/lexai.yaml"));
        assert!(matches!(cli.command, Commands::Variants));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["lexai"]).is_err());
    }
}
