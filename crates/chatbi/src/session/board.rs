use crate::decoder::Effect;
use crate::models::{Message, MessagePatch};

/// In-memory view of the open conversation, the state a UI renders from.
/// Receives both preview and committed patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBoard {
    messages: Vec<Message>,
}

impl MessageBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    /// Appends, or replaces a message with the same id.
    pub fn upsert(&mut self, message: Message) {
        match self.messages.iter_mut().find(|existing| existing.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    /// Returns `false` when the patch targets an unknown message.
    pub fn apply_patch(&mut self, patch: &MessagePatch) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|message| message.id == patch.message_id)
        {
            Some(message) => {
                message.apply_fields(&patch.fields);
                true
            }
            None => false,
        }
    }

    pub fn apply_effect(&mut self, effect: &Effect) -> bool {
        self.apply_patch(effect.patch())
    }
}
