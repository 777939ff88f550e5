use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::models::{Message, MessageRole, MessageStatus, derive_title};
use crate::sqlite::{
    NewMessage, count_messages, create_conversation, create_message, get_conversation,
    update_conversation_title,
};

/// Rows created for one user question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedTurn {
    pub conversation_id: String,
    pub title: String,
    pub created_conversation: bool,
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Stores the user question and a `processing` assistant placeholder in one
/// transaction. A missing `conversation_id` creates a new conversation; the
/// first question of a conversation also names it.
pub fn start_turn(
    connection: &Connection,
    conversation_id: Option<&str>,
    question: &str,
) -> Result<StartedTurn> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question must not be empty");
    }

    let tx = connection
        .unchecked_transaction()
        .context("failed to open sqlite transaction")?;

    let (conversation, created_conversation) = match conversation_id {
        Some(id) => match get_conversation(&tx, id)? {
            Some(conversation) => (conversation, false),
            None => bail!("conversation not found: {id}"),
        },
        None => (create_conversation(&tx, None)?, true),
    };

    let first_question = count_messages(&tx, &conversation.id)? == 0;
    let user_message = create_message(
        &tx,
        &NewMessage {
            conversation_id: &conversation.id,
            role: MessageRole::User,
            content: question,
            status: None,
        },
    )?;

    let title = if first_question {
        let title = derive_title(question);
        update_conversation_title(&tx, &conversation.id, &title)?;
        title
    } else {
        conversation.title.clone()
    };

    let assistant_message = create_message(
        &tx,
        &NewMessage {
            conversation_id: &conversation.id,
            role: MessageRole::Assistant,
            content: "",
            status: Some(MessageStatus::Processing),
        },
    )?;

    tx.commit().context("failed to commit turn transaction")?;
    info!(
        conversation_id = %conversation.id,
        message_id = %assistant_message.id,
        created_conversation,
        "turn started"
    );

    Ok(StartedTurn {
        conversation_id: conversation.id,
        title,
        created_conversation,
        user_message,
        assistant_message,
    })
}
