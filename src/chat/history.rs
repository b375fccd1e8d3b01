//! Conversation history with an epoch guard.
//!
//! A turn captures `(messages, epoch)` when it starts and appends its
//! messages only if the epoch is unchanged when it completes. `clear` bumps
//! the epoch, so turns still streaming keep their snapshot and never write
//! into the cleared history.

use crate::types::Message;

#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    epoch: u64,
}

impl ConversationHistory {
    pub fn snapshot(&self) -> (Vec<Message>, u64) {
        (self.messages.clone(), self.epoch)
    }

    /// Returns whether the messages were appended.
    pub fn append_if_current(&mut self, epoch: u64, messages: Vec<Message>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.messages.extend(messages);
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
