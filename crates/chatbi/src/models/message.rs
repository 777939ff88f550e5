use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::patch::PatchFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Lifecycle of an assistant answer. `None` on a [`Message`] means the
/// message never entered the streaming lifecycle (user input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Processing,
    Completed,
    Error,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(default)]
    pub query_result: Option<Value>,

    #[serde(default)]
    pub status: Option<MessageStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Chart description generated from `query_result` on request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<Value>,

    pub created_at: String,
}

impl Message {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(MessageStatus::is_terminal)
    }

    /// Merges the provided fields; absent fields are left untouched.
    pub fn apply_fields(&mut self, fields: &PatchFields) {
        if let Some(content) = &fields.content {
            self.content.clone_from(content);
        }
        if let Some(sql_query) = &fields.sql_query {
            self.sql_query = Some(sql_query.clone());
        }
        if let Some(query_result) = &fields.query_result {
            self.query_result = Some(query_result.clone());
        }
        if let Some(status) = fields.status {
            self.status = Some(status);
        }
        if let Some(error_message) = &fields.error_message {
            self.error_message = Some(error_message.clone());
        }
    }
}

#[must_use]
pub fn json_schema() -> Value {
    let schema = schemars::schema_for!(Message);
    match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => {
            panic!("failed to serialize generated message schema: {error}");
        }
    }
}
