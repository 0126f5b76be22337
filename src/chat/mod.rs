//! Chat application module for interactive conversations with Gemini.
//!
//! This module provides the REPL-facing pieces built on top of the genchat
//! client library:
//!
//! - Typewriter reveal of each reply
//! - An optional image attachment per message
//! - Slash commands for session control
//! - Configurable model, sampling parameters, and web search
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Conversation ownership and turn submission
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatConfig, GenchatArgs, MAX_TEMPERATURE};
pub use session::{ChatSession, SessionStats, TurnOutcome, TurnReport};
