use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::engines::Role;
use crate::error::{LexaiError, Result};
use crate::storage::{Conversation, ConversationStore, ConversationSummary};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_COLUMN_CHARS: usize = 40;

/// Handle history commands against the configured log directory
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = ConversationStore::new(&config.storage.log_dir)?;

    match command {
        HistoryCommand::List { json } => {
            let conversations = store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&conversations)?);
                return Ok(());
            }
            if conversations.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }
            print_table(&conversations);
            println!(
                "Use {} to read a conversation.",
                "lexai history show <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            let conversation = store
                .load(&id)?
                .ok_or_else(|| LexaiError::NotFound(id.clone()))?;
            print_conversation(&conversation);
        }
        HistoryCommand::Rename { id, title } => {
            let conversation = store
                .rename(&id, &title)?
                .ok_or_else(|| LexaiError::NotFound(id.clone()))?;
            println!(
                "{}",
                format!("Renamed {} to \"{}\"", conversation.id, conversation.title).green()
            );
        }
    }

    Ok(())
}

fn print_table(conversations: &[ConversationSummary]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Created".bold(),
        "Last Updated".bold()
    ]);

    for conversation in conversations {
        table.add_row(prettytable::row![
            conversation.id.cyan(),
            truncate(&conversation.title, TITLE_COLUMN_CHARS),
            conversation.created_at.format("%Y-%m-%d %H:%M").to_string(),
            conversation.updated_at.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }

    println!("\nConversation History:");
    table.printstd();
    println!();
}

fn print_conversation(conversation: &Conversation) {
    println!("{}", conversation.title.bold());
    println!(
        "{} {}  {} {}",
        "id:".dimmed(),
        conversation.id,
        "updated:".dimmed(),
        conversation.updated_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(model) = &conversation.model {
        println!("{} {}", "model:".dimmed(), model);
    }
    println!();

    for message in &conversation.messages {
        let label = match message.role {
            Role::User => "user".cyan().bold(),
            Role::Assistant => "assistant".green().bold(),
            Role::System => "system".yellow().bold(),
        };
        println!("{}", label);
        println!("{}", message.content);
        println!();
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("짧은 제목", 40), "짧은 제목");
        let long = "가".repeat(50);
        let cut = truncate(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_rename_missing_conversation_is_not_found() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let err = handle_history(
            &config,
            HistoryCommand::Rename {
                id: "missing".to_string(),
                title: "t".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LexaiError>(),
            Some(LexaiError::NotFound(_))
        ));
    }

    #[test]
    fn test_rename_updates_record() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let store = ConversationStore::new(dir.path()).unwrap();
        let record = store.save_exchange(None, "질문", "답변", &[], None).unwrap();

        handle_history(
            &config,
            HistoryCommand::Rename {
                id: record.id.clone(),
                title: "보증금 반환".to_string(),
            },
        )
        .unwrap();

        assert_eq!(store.load(&record.id).unwrap().unwrap().title, "보증금 반환");
    }

    #[test]
    fn test_list_empty_directory() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        assert!(handle_history(&config, HistoryCommand::List { json: false }).is_ok());
    }
}
