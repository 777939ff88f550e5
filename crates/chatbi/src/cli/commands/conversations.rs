use anyhow::{Error, Result};
use clap::{Args, Subcommand};
use rusqlite::Connection;
use serde_json::json;

use super::print_envelope;
use crate::config::RuntimePaths;
use crate::models::{CommandFailure, ResponseEnvelope};
use crate::sqlite::{
    create_conversation, delete_conversation, ensure_sqlite_schema, get_conversation,
    list_conversations, open_sqlite_connection, update_conversation_title,
};

#[derive(Debug, Clone, Args)]
pub struct ConversationsArgs {
    #[command(subcommand)]
    pub command: ConversationsCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConversationsCommand {
    Create(CreateArgs),
    List,
    Show(ShowArgs),
    Rename(RenameArgs),
    Delete(DeleteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Args)]
pub struct RenameArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(value_name = "TITLE")]
    pub title: String,
}

#[derive(Debug, Clone, Args)]
pub struct DeleteArgs {
    #[arg(value_name = "ID")]
    pub id: String,
}

impl ConversationsCommand {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "conversations.create",
            Self::List => "conversations.list",
            Self::Show(_) => "conversations.show",
            Self::Rename(_) => "conversations.rename",
            Self::Delete(_) => "conversations.delete",
        }
    }
}

pub fn run(args: &ConversationsArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let command = args.command.name();
    let connection = open_store(runtime_paths).map_err(|error| {
        Error::new(CommandFailure::new(ResponseEnvelope::from_error(
            command,
            "store_unavailable",
            "failed to open conversation store",
            &error,
        )))
    })?;

    let envelope = match &args.command {
        ConversationsCommand::Create(create) => {
            let conversation = create_conversation(&connection, create.title.as_deref())?;
            ResponseEnvelope::ok(command, json!({ "conversation": conversation }))
        }
        ConversationsCommand::List => {
            let conversations = list_conversations(&connection)?;
            ResponseEnvelope::ok(
                command,
                json!({ "count": conversations.len(), "conversations": conversations }),
            )
        }
        ConversationsCommand::Show(show) => match get_conversation(&connection, &show.id)? {
            Some(conversation) => {
                ResponseEnvelope::ok(command, json!({ "conversation": conversation }))
            }
            None => return Err(not_found(command, &show.id)),
        },
        ConversationsCommand::Rename(rename) => {
            let title = rename.title.trim();
            if title.is_empty() {
                return Err(Error::new(CommandFailure::new(
                    ResponseEnvelope::error(command, "title_invalid", "title must not be empty")
                        .with_error_details(json!({ "id": rename.id })),
                )));
            }
            if !update_conversation_title(&connection, &rename.id, title)? {
                return Err(not_found(command, &rename.id));
            }
            ResponseEnvelope::ok(command, json!({ "id": rename.id, "title": title }))
        }
        ConversationsCommand::Delete(delete) => {
            if !delete_conversation(&connection, &delete.id)? {
                return Err(not_found(command, &delete.id));
            }
            ResponseEnvelope::ok(command, json!({ "id": delete.id, "deleted": true }))
        }
    };

    print_envelope(&envelope.with_meta(
        "database_path",
        json!(runtime_paths.database_path.display().to_string()),
    ))
}

pub(crate) fn open_store(runtime_paths: &RuntimePaths) -> Result<Connection> {
    let connection = open_sqlite_connection(&runtime_paths.database_path)?;
    ensure_sqlite_schema(&connection)?;
    Ok(connection)
}

fn not_found(command: &str, id: &str) -> Error {
    Error::new(CommandFailure::new(
        ResponseEnvelope::error(command, "conversation_not_found", "conversation not found")
            .with_error_details(json!({ "id": id })),
    ))
}
