use std::fmt;

use time::OffsetDateTime;

use crate::types::ImageAttachment;

/// Session-unique identity of a message, assigned when it is appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub(crate) u64);

impl MessageId {
    /// The raw sequence number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation.
///
/// `displayed_content` is always a prefix of `content`. User messages are
/// fully displayed from the start; assistant replies begin empty and grow one
/// character at a time while being revealed.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub(crate) id: MessageId,
    pub role: Role,
    pub(crate) content: String,
    pub(crate) displayed_content: String,
    pub image: Option<ImageAttachment>,
    /// True when this assistant entry reports a failed turn instead of a reply.
    pub failed: bool,
    pub created_at: OffsetDateTime,
}

impl Message {
    /// A user message, displayed immediately.
    pub fn user(content: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        let content = content.into();
        Self {
            id: MessageId::default(),
            role: Role::User,
            displayed_content: content.clone(),
            content,
            image,
            failed: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// An assistant reply awaiting its reveal.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::default(),
            role: Role::Assistant,
            content: content.into(),
            displayed_content: String::new(),
            image: None,
            failed: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// An assistant message that needs no reveal.
    pub fn assistant_revealed(content: impl Into<String>) -> Self {
        let mut message = Self::assistant(content);
        message.displayed_content = message.content.clone();
        message
    }

    /// An assistant entry describing a failed turn.
    pub fn failure(error: &crate::Error) -> Self {
        let mut message = Self::assistant(format!("Error: {error}"));
        message.failed = true;
        message
    }

    /// The full text of the message.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// The revealed prefix of `content`.
    pub fn displayed_content(&self) -> &str {
        &self.displayed_content
    }

    /// Characters of `content` not yet revealed.
    pub fn remaining(&self) -> &str {
        &self.content[self.displayed_content.len()..]
    }

    /// True once the displayed prefix covers the whole content.
    pub fn is_revealed(&self) -> bool {
        self.displayed_content.len() == self.content.len()
    }

    /// Number of characters currently displayed.
    pub fn displayed_chars(&self) -> usize {
        self.displayed_content.chars().count()
    }

    /// Grows the displayed prefix by exactly one character, returning it.
    pub fn advance_reveal(&mut self) -> Option<char> {
        let next = self.remaining().chars().next()?;
        self.displayed_content.push(next);
        Some(next)
    }

    /// Reveals everything that is left, returning what was added.
    pub fn reveal_all(&mut self) -> String {
        let rest = self.remaining().to_string();
        self.displayed_content.push_str(&rest);
        rest
    }
}

/// Fields that [`crate::Conversation::update_last`] merges into the final message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub displayed_content: Option<String>,
}

impl MessagePatch {
    pub fn displayed_content(content: impl Into<String>) -> Self {
        Self {
            displayed_content: Some(content.into()),
        }
    }
}
