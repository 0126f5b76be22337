//! The in-memory, append-only conversation store.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::types::{Message, MessageId, MessagePatch};

/// Greeting that opens every session.
pub const GREETING: &str = "Hello! How can I help you today?";

/// An insertion-ordered sequence of messages.
///
/// Messages are only ever appended; the sole in-place mutation is growing the
/// displayed prefix of the final message through [`Conversation::update_last`].
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_id: u64,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Creates a conversation opened by the assistant's greeting.
    pub fn with_greeting() -> Self {
        let mut conversation = Self::new();
        conversation.append(Message::assistant_revealed(GREETING));
        conversation
    }

    /// Adds a message to the end and returns the id assigned to it.
    pub fn append(&mut self, mut message: Message) -> MessageId {
        let id = MessageId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        message.id = id;
        self.messages.push(message);
        id
    }

    /// Merges `patch` into the final message.
    ///
    /// The displayed content must remain a prefix of the content and may not
    /// shrink.
    pub fn update_last(&mut self, patch: MessagePatch) -> Result<MessageId> {
        let last = self
            .messages
            .last_mut()
            .ok_or_else(|| Error::validation("conversation is empty", None))?;
        if let Some(displayed) = patch.displayed_content {
            if !last.content.starts_with(&displayed) {
                return Err(Error::validation(
                    "displayed content must be a prefix of the content",
                    Some("displayed_content".to_string()),
                ));
            }
            if displayed.len() < last.displayed_content.len() {
                return Err(Error::validation(
                    "displayed content may not shrink",
                    Some("displayed_content".to_string()),
                ));
            }
            last.displayed_content = displayed;
        }
        Ok(last.id)
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    /// Looks up a message by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        // ids are assigned in append order, so they are sorted
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|idx| &self.messages[idx])
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of user-authored messages.
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }
}

/// A conversation shared between the session and the reveal task.
#[derive(Debug, Clone, Default)]
pub struct SharedConversation {
    inner: Arc<Mutex<Conversation>>,
}

impl SharedConversation {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conversation)),
        }
    }

    /// Locks the conversation.
    ///
    /// A panic while holding the lock cannot leave a half-applied mutation
    /// behind, so a poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, Conversation> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` with the conversation locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        f(&mut self.lock())
    }

    /// Returns a clone of every message.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_ids() {
        let mut conversation = Conversation::new();
        let a = conversation.append(Message::user("one", None));
        let b = conversation.append(Message::assistant("two"));
        assert!(a < b);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.get(a).unwrap().content(), "one");
        assert_eq!(conversation.get(b).unwrap().content(), "two");
        assert_eq!(conversation.last().unwrap().id(), b);
    }

    #[test]
    fn greeting_is_fully_displayed() {
        let conversation = Conversation::with_greeting();
        let greeting = conversation.last().unwrap();
        assert_eq!(greeting.content(), GREETING);
        assert!(greeting.is_revealed());
        assert!(!greeting.is_user());
    }

    #[test]
    fn update_last_grows_prefix() {
        let mut conversation = Conversation::new();
        let id = conversation.append(Message::assistant("Hi there"));
        assert_eq!(
            conversation
                .update_last(MessagePatch::displayed_content("Hi"))
                .unwrap(),
            id
        );
        assert_eq!(conversation.last().unwrap().displayed_content(), "Hi");
    }

    #[test]
    fn update_last_rejects_non_prefix_and_shrinking() {
        let mut conversation = Conversation::new();
        conversation.append(Message::assistant("Hi there"));
        conversation
            .update_last(MessagePatch::displayed_content("Hi t"))
            .unwrap();
        assert!(
            conversation
                .update_last(MessagePatch::displayed_content("Bye"))
                .unwrap_err()
                .is_validation()
        );
        assert!(
            conversation
                .update_last(MessagePatch::displayed_content("Hi"))
                .unwrap_err()
                .is_validation()
        );
        assert_eq!(conversation.last().unwrap().displayed_content(), "Hi t");
    }

    #[test]
    fn update_last_on_empty_fails() {
        let mut conversation = Conversation::new();
        assert!(conversation.update_last(MessagePatch::default()).is_err());
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut conversation = Conversation::new();
        conversation.append(Message::assistant("abc"));
        conversation.update_last(MessagePatch::default()).unwrap();
        assert_eq!(conversation.last().unwrap().displayed_content(), "");
    }
}
