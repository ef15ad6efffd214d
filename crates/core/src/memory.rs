//! Agent memory: the ordered message log that forms the model's context.
//!
//! Memory is append-only: messages are never edited or reordered once
//! pushed. Each agent owns exactly one `Memory`; nothing else mutates it.

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::{Message, Role};

/// Ordered, append-only log of role-tagged messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a message whose role is given by name (`user`, `system`,
    /// `assistant` or `tool`). Unknown roles are rejected.
    ///
    /// `tool_call_id` is only honoured for `tool` messages.
    pub fn append(
        &mut self,
        role: &str,
        content: impl Into<String>,
        base64_image: Option<String>,
        tool_call_id: Option<String>,
    ) -> Result<(), MemoryError> {
        let role: Role = role.parse()?;
        let mut message = Message::with_role(role, content);
        if role == Role::Tool {
            message.tool_call_id = tool_call_id;
        }
        message.base64_image = base64_image;
        self.messages.push(message);
        Ok(())
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message. Only used when an agent is reset between tasks.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Count earlier assistant messages whose content equals the content of
    /// the most recent message. Returns 0 when the last message is empty.
    pub fn repeats_of_last(&self) -> usize {
        let Some((last, earlier)) = self.messages.split_last() else {
            return 0;
        };
        if last.content.is_empty() {
            return 0;
        }
        earlier
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant && m.content == last.content)
            .count()
    }
}
