use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::MessageStatus;

/// Partial set of message fields. `None` means "leave as is", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PatchFields {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.sql_query.is_none()
            && self.query_result.is_none()
            && self.status.is_none()
            && self.error_message.is_none()
    }

    #[must_use]
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_sql_query(mut self, sql_query: impl Into<String>) -> Self {
        self.sql_query = Some(sql_query.into());
        self
    }

    #[must_use]
    pub fn with_query_result(mut self, query_result: Value) -> Self {
        self.query_result = Some(query_result);
        self
    }

    #[must_use]
    pub fn with_error_message(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    pub message_id: String,
    pub fields: PatchFields,
}

impl MessagePatch {
    #[must_use]
    pub fn new(message_id: impl Into<String>, fields: PatchFields) -> Self {
        Self {
            message_id: message_id.into(),
            fields,
        }
    }
}
