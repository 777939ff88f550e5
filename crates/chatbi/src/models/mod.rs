pub mod conversation;
pub mod envelope;
pub mod message;
pub mod patch;
pub mod query_result;

pub use conversation::{
    Conversation, ConversationSummary, DEFAULT_CONVERSATION_TITLE, TITLE_MAX_CHARS, derive_title,
};
pub use envelope::{CommandFailure, RESPONSE_ENVELOPE_SCHEMA_VERSION, ResponseEnvelope};
pub use message::{Message, MessageRole, MessageStatus, json_schema};
pub use patch::{MessagePatch, PatchFields};
pub use query_result::{DISPLAY_ROW_CAP, QueryResultSummary, ResultShape};
