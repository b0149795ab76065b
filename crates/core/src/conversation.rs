//! Conversation memory.

use toolchat_model::ModelMessage;

/// Who produced a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person chatting with the agent.
    User,
    /// The model.
    Assistant,
    /// A tool answering a call from the model.
    Tool,
}

/// The messages exchanged so far, oldest first.
///
/// Only complete turns are kept: a turn that fails is removed again.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    items: Vec<Item>,
}

impl Conversation {
    /// Returns the items of the conversation.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the conversation has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Shortens the conversation to its first `len` items.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Removes every item.
    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: ModelMessage, transcript: String) {
        self.items.push(Item { msg, transcript });
    }

    pub(crate) fn messages(&self) -> impl Iterator<Item = &ModelMessage> {
        self.items.iter().map(|item| &item.msg)
    }
}

/// An item in the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    msg: ModelMessage,
    transcript: String,
}

impl Item {
    /// Returns who produced this item.
    pub fn role(&self) -> Role {
        match &self.msg {
            // System prompts are never stored in the conversation, treat
            // one as user-provided text if it shows up.
            ModelMessage::System(_) | ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is a string representation of the message item,
    /// which can be exported later. But transcript alone is not enough
    /// to reconstruct the message item.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Returns the underlying model message.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }
}
