use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::message::Message;

pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";
pub const TITLE_MAX_CHARS: usize = 30;
const TITLE_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

/// Conversation row as listed in the sidebar: no full history, only the most
/// recent message (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<Message>,
}

/// Title derived from the first user message: the first 30 characters, with
/// `...` appended when the question was longer.
#[must_use]
pub fn derive_title(first_user_message: &str) -> String {
    let char_count = first_user_message.chars().count();
    if char_count <= TITLE_MAX_CHARS {
        return first_user_message.to_string();
    }

    let mut title = first_user_message
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect::<String>();
    title.push_str(TITLE_ELLIPSIS);
    title
}
