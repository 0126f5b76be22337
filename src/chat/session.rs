//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation,
//! sends each turn through the dispatcher, and starts the reveal of every
//! reply.

use std::fmt;
use std::path::Path;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::chat::config::ChatConfig;
use crate::client::Gemini;
use crate::conversation::{Conversation, SharedConversation};
use crate::dispatcher::{Dispatcher, Reply};
use crate::error::{Error, Result};
use crate::reveal::{RevealEvent, RevealScheduler};
use crate::types::{ImageAttachment, Message, MessageId, Model, UsageMetadata};

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The API answered; the reply is being revealed.
    Replied(Reply),
    /// The turn failed; a failure message was recorded in its place.
    Failed(Error),
}

impl TurnOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TurnOutcome::Failed(_))
    }
}

/// The messages one submitted turn added to the conversation.
#[derive(Debug)]
pub struct TurnReport {
    pub user_id: MessageId,
    pub reply_id: MessageId,
    pub outcome: TurnOutcome,
}

/// A chat session that manages conversation state and API interactions.
pub struct ChatSession {
    config: ChatConfig,
    conversation: SharedConversation,
    dispatcher: Dispatcher,
    reveal: RevealScheduler,
    pending_image: Option<ImageAttachment>,
    usage_totals: UsageMetadata,
    last_turn_usage: Option<UsageMetadata>,
    request_count: u64,
    failed_count: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The model used for the next request.
    pub model: Model,
    /// The number of messages in the conversation, greeting included.
    pub message_count: usize,
    /// The number of user turns.
    pub user_turns: usize,
    /// Total number of API requests made.
    pub total_requests: u64,
    /// Requests that ended in a failure message.
    pub failed_requests: u64,
    /// Token totals across all successful requests.
    pub usage_totals: UsageMetadata,
    /// Token usage of the last successful turn, if any.
    pub last_turn_usage: Option<UsageMetadata>,
    /// Name of the image waiting to be sent, if any.
    pub pending_image: Option<String>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:            {}", self.model)?;
        writeln!(f, "Messages:         {}", self.message_count)?;
        writeln!(f, "User turns:       {}", self.user_turns)?;
        writeln!(
            f,
            "Requests:         {} ({} failed)",
            self.total_requests, self.failed_requests
        )?;
        writeln!(
            f,
            "Tokens:           {} prompt, {} reply, {} total",
            self.usage_totals.prompt_token_count,
            self.usage_totals.candidates_token_count,
            self.usage_totals.total_token_count
        )?;
        if let Some(last) = &self.last_turn_usage {
            writeln!(f, "Last turn tokens: {}", last.total_token_count)?;
        }
        match &self.pending_image {
            Some(name) => write!(f, "Pending image:    {name}"),
            None => write!(f, "Pending image:    none"),
        }
    }
}

impl ChatSession {
    /// Creates a session opened by the greeting.
    ///
    /// The receiver yields an event for every character revealed; the
    /// caller prints from it. Fails if the configuration does not validate.
    pub fn new(
        client: Gemini,
        config: ChatConfig,
    ) -> Result<(Self, UnboundedReceiver<RevealEvent>)> {
        config.validate()?;
        let conversation = SharedConversation::new(Conversation::with_greeting());
        let (reveal, events) =
            RevealScheduler::new(conversation.clone(), config.reveal_interval)?;
        let session = Self {
            config,
            conversation,
            dispatcher: Dispatcher::new(client),
            reveal,
            pending_image: None,
            usage_totals: UsageMetadata::default(),
            last_turn_usage: None,
            request_count: 0,
            failed_count: 0,
        };
        Ok((session, events))
    }

    /// Creates a session whose client is built from the configuration and
    /// the API key environment variables.
    pub fn from_config(config: ChatConfig) -> Result<(Self, UnboundedReceiver<RevealEvent>)> {
        let client = Gemini::with_options(None, config.base_url.clone(), Some(config.timeout))?;
        Self::new(client, config)
    }

    /// Sends one turn.
    ///
    /// The input is stored and sent as typed. Returns `Ok(None)` without
    /// touching the conversation when it is blank and no image is pending.
    /// Returns [`Error::Busy`] without touching the conversation while
    /// another request is in flight. Any other failure is recorded as a
    /// failed assistant message and reported through [`TurnOutcome::Failed`].
    pub async fn submit(&mut self, input: &str) -> Result<Option<TurnReport>> {
        if input.trim().is_empty() && self.pending_image.is_none() {
            return Ok(None);
        }
        let guard = self.dispatcher.begin()?;

        self.reveal.finish_now();
        let image = self.pending_image.take();
        let user_id = self
            .conversation
            .lock()
            .append(Message::user(input, image.clone()));

        let settings = self.config.request_settings();
        self.request_count += 1;
        let result = self
            .dispatcher
            .dispatch_reserved(guard, input, image.as_ref(), &settings)
            .await;

        let (message, outcome) = match result {
            Ok(reply) => {
                if let Some(usage) = reply.usage {
                    self.usage_totals.prompt_token_count += usage.prompt_token_count;
                    self.usage_totals.candidates_token_count += usage.candidates_token_count;
                    self.usage_totals.total_token_count += usage.total_token_count;
                }
                self.last_turn_usage = reply.usage;
                (Message::assistant(&reply.text), TurnOutcome::Replied(reply))
            }
            Err(err) => {
                self.failed_count += 1;
                tracing::warn!(error = %err, "turn failed");
                (Message::failure(&err), TurnOutcome::Failed(err))
            }
        };
        let reply_id = self.conversation.lock().append(message);
        self.reveal.start();

        Ok(Some(TurnReport {
            user_id,
            reply_id,
            outcome,
        }))
    }

    /// Loads an image to send with the next message, replacing any image
    /// already pending. On error the pending image is left as it was.
    pub fn attach_image(&mut self, path: impl AsRef<Path>) -> Result<&ImageAttachment> {
        let image = ImageAttachment::from_path(path)?;
        tracing::debug!(file = %image.file_name, size = image.size, "image attached");
        Ok(self.pending_image.insert(image))
    }

    /// Removes the pending image, returning it.
    pub fn detach_image(&mut self) -> Option<ImageAttachment> {
        self.pending_image.take()
    }

    pub fn pending_image(&self) -> Option<&ImageAttachment> {
        self.pending_image.as_ref()
    }

    /// True while a request is outstanding.
    pub fn is_loading(&self) -> bool {
        self.dispatcher.is_in_flight()
    }

    /// True while a reply is still being revealed.
    pub fn is_revealing(&self) -> bool {
        self.reveal.active().is_some()
    }

    /// Reveals the rest of the current reply at once, returning the text
    /// that had not been shown yet.
    pub fn finish_reveal(&mut self) -> Option<(MessageId, String)> {
        self.reveal.finish_now()
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn set_model(&mut self, model: Model) {
        tracing::info!(%model, "model changed");
        self.config.model = model;
    }

    pub fn set_web_search(&mut self, enabled: bool) {
        self.config.web_search = enabled;
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> Result<()> {
        let config = self.config.clone().with_max_tokens(max_tokens);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        let config = self.config.clone().with_temperature(temperature);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        let conversation = self.conversation.lock();
        SessionStats {
            model: self.config.model.clone(),
            message_count: conversation.len(),
            user_turns: conversation.user_turns(),
            total_requests: self.request_count,
            failed_requests: self.failed_count,
            usage_totals: self.usage_totals,
            last_turn_usage: self.last_turn_usage,
            pending_image: self.pending_image.as_ref().map(|i| i.file_name.clone()),
        }
    }
}
