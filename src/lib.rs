// Public modules
pub mod chat;
pub mod client;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod observability;
pub mod render;
pub mod reveal;
pub mod types;

// Re-exports
pub use client::{API_KEY_VARS, Gemini};
pub use conversation::{Conversation, GREETING, SharedConversation};
pub use dispatcher::{Dispatcher, InFlight, Reply, RequestSettings};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use reveal::{DEFAULT_REVEAL_INTERVAL, RevealEvent, RevealHandle, RevealScheduler, RevealState};
pub use types::*;
