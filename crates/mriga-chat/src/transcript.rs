//! Ordered conversation transcript.

use mriga_core::types::{ConversationMessage, Speaker};

/// Append-only list of messages for the current conversation.
///
/// The last assistant message is an open accumulator while its reply
/// streams in; closing it makes it immutable.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
    reply_open: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append the user's message followed by an empty reply placeholder.
    ///
    /// A reply still open from an abandoned turn is closed as-is.
    pub fn begin_turn(&mut self, user_text: &str) {
        self.messages.push(ConversationMessage::user(user_text));
        self.messages.push(ConversationMessage::assistant(""));
        self.reply_open = true;
    }

    /// Append a streamed fragment to the open reply.
    pub fn append_to_reply(&mut self, fragment: &str) {
        if let Some(reply) = self.open_reply() {
            reply.text.push_str(fragment);
        }
    }

    /// Replace the open reply's text and close it.
    pub fn replace_reply(&mut self, text: &str) {
        if let Some(reply) = self.open_reply() {
            reply.text = text.to_string();
        }
        self.reply_open = false;
    }

    /// Close the open reply, returning its final text.
    pub fn close_reply(&mut self) -> Option<String> {
        let text = self.open_reply().map(|reply| reply.text.clone());
        self.reply_open = false;
        text
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.reply_open = false;
    }

    fn open_reply(&mut self) -> Option<&mut ConversationMessage> {
        if !self.reply_open {
            return None;
        }
        self.messages
            .last_mut()
            .filter(|m| m.speaker == Speaker::Assistant)
    }
}
