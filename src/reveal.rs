//! Typewriter reveal of assistant replies.
//!
//! A reply arrives whole; the scheduler then lengthens its displayed prefix by
//! one character per tick. Only the last message in the conversation is ever
//! animated, and each cycle is owned by a [`RevealHandle`] that is cancelled
//! when a new cycle starts or the scheduler is dropped.

use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::conversation::{Conversation, SharedConversation};
use crate::error::{Error, Result};
use crate::observability::{
    REVEAL_CANCELLED, REVEAL_CHARACTERS, REVEAL_COMPLETED, REVEAL_STARTED,
};
use crate::types::{Message, MessageId};

/// Time between two revealed characters.
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(100);

/// Where a message stands in its reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    /// The displayed prefix is shorter than the content.
    Pending,
    /// The whole content is displayed.
    Complete,
}

impl RevealState {
    pub fn of(message: &Message) -> Self {
        if message.is_revealed() {
            RevealState::Complete
        } else {
            RevealState::Pending
        }
    }
}

/// Progress notifications sent to the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealEvent {
    /// One more character of `id` is displayed.
    Advanced { id: MessageId, chunk: String },
    /// `id` is fully displayed.
    Completed { id: MessageId },
}

/// Owned handle on a running reveal cycle.
#[derive(Debug)]
pub struct RevealHandle {
    id: MessageId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    // set when the cycle is being finished rather than abandoned
    finished_early: bool,
}

impl RevealHandle {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn stop(&self) {
        if !self.finished_early && !self.task.is_finished() {
            REVEAL_CANCELLED.click();
            tracing::debug!(id = %self.id, "cancelling reveal");
        }
        self.cancel.cancel();
        self.task.abort();
    }
}

impl Drop for RevealHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives the reveal of the conversation's last message.
pub struct RevealScheduler {
    conversation: SharedConversation,
    interval: Duration,
    events: UnboundedSender<RevealEvent>,
    active: Option<RevealHandle>,
}

impl RevealScheduler {
    /// Creates a scheduler and the receiver its events are delivered on.
    ///
    /// Fails if `interval` is zero.
    pub fn new(
        conversation: SharedConversation,
        interval: Duration,
    ) -> Result<(Self, UnboundedReceiver<RevealEvent>)> {
        check_interval(interval)?;
        let (events, rx) = unbounded_channel();
        let scheduler = Self {
            conversation,
            interval,
            events,
            active: None,
        };
        Ok((scheduler, rx))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sets the tick for subsequent cycles. A zero interval is refused and
    /// the previous one kept.
    pub fn set_interval(&mut self, interval: Duration) -> Result<()> {
        check_interval(interval)?;
        self.interval = interval;
        Ok(())
    }

    /// Id of the message being revealed, if a cycle is still running.
    pub fn active(&self) -> Option<MessageId> {
        self.active
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .map(RevealHandle::id)
    }

    /// Starts a cycle for the last message if it still needs revealing.
    ///
    /// Any previous cycle is cancelled first. The new cycle resumes from the
    /// message's current displayed length. Must be called within a tokio
    /// runtime.
    pub fn start(&mut self) -> Option<MessageId> {
        if let Some(previous) = self.active.take() {
            drop(previous);
        }

        let id = {
            let conversation = self.conversation.lock();
            let last = conversation.last()?;
            if last.is_user() || RevealState::of(last) == RevealState::Complete {
                return None;
            }
            last.id()
        };

        REVEAL_STARTED.click();
        tracing::debug!(%id, interval_ms = self.interval.as_millis() as u64, "starting reveal");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            id,
            self.conversation.clone(),
            self.interval,
            self.events.clone(),
            cancel.clone(),
        ));
        self.active = Some(RevealHandle {
            id,
            cancel,
            task,
            finished_early: false,
        });
        Some(id)
    }

    /// Cancels the running cycle, leaving the message partially revealed.
    pub fn cancel(&mut self) {
        self.active.take();
    }

    /// Cancels the running cycle and displays the rest of its message at once.
    ///
    /// Returns the id and the text that was added, or `None` when no cycle
    /// is running, including one that already completed on its own.
    pub fn finish_now(&mut self) -> Option<(MessageId, String)> {
        let mut handle = self.active.take()?;
        if handle.is_finished() {
            return None;
        }
        handle.finished_early = true;
        let id = handle.id();
        drop(handle);
        let rest = self.conversation.with(|conversation| {
            conversation
                .last_mut()
                .filter(|last| last.id() == id)
                .map(Message::reveal_all)
        })?;
        REVEAL_COMPLETED.click();
        Some((id, rest))
    }
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::validation(
            "reveal interval must be positive",
            Some("reveal_interval".to_string()),
        ));
    }
    Ok(())
}

/// Outcome of a single tick.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Advanced { chunk: char, done: bool },
    Complete,
    Superseded,
}

fn step(conversation: &mut Conversation, id: MessageId) -> Step {
    let Some(last) = conversation.last_mut().filter(|last| last.id() == id) else {
        return Step::Superseded;
    };
    match last.advance_reveal() {
        Some(chunk) => Step::Advanced {
            chunk,
            done: last.is_revealed(),
        },
        None => Step::Complete,
    }
}

async fn run(
    id: MessageId,
    conversation: SharedConversation,
    period: Duration,
    events: UnboundedSender<RevealEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match conversation.with(|c| step(c, id)) {
            Step::Advanced { chunk, done } => {
                REVEAL_CHARACTERS.click();
                let _ = events.send(RevealEvent::Advanced {
                    id,
                    chunk: chunk.to_string(),
                });
                if done {
                    REVEAL_COMPLETED.click();
                    tracing::debug!(%id, "reveal complete");
                    let _ = events.send(RevealEvent::Completed { id });
                    return;
                }
            }
            Step::Complete => {
                REVEAL_COMPLETED.click();
                let _ = events.send(RevealEvent::Completed { id });
                return;
            }
            Step::Superseded => return,
        }
    }
}
