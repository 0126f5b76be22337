//! Interactive chat application for conversing with Gemini.
//!
//! Each reply is typed out a character at a time. Press Ctrl+C while a reply
//! is typing to show the rest at once.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! GEMINI_API_KEY=... genchat
//!
//! # Specify a model and a faster reveal
//! genchat --model gemini-1.5-pro --reveal-interval-ms 20
//!
//! # Read settings from a file, overriding one of them
//! genchat --config genchat.yaml --temperature 0.3
//!
//! # Disable colors (useful for piping output)
//! genchat --no-color
//! ```
//!
//! # Commands
//!
//! - `/image <path>` - Attach an image to the next message
//! - `/model <name>` - Change the model
//! - `/search on|off` - Toggle web search
//! - `/history` - Show the whole conversation
//! - `/help` - Show every command
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use genchat::chat::{
    ChatCommand, ChatConfig, ChatSession, GenchatArgs, PlainTextRenderer, Renderer, TurnReport,
    help_text, parse_command,
};
use genchat::render::{attachment_marker, render_transcript};
use genchat::{KnownModel, Message, MessageId, Model, RevealEvent};

/// How often the interrupt flag is polled while a reply is typing.
const INTERRUPT_POLL: Duration = Duration::from_millis(25);

/// Main entry point for the genchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genchat=warn")))
        .init();

    let (args, _) = GenchatArgs::from_command_line_relaxed("genchat [OPTIONS]");
    let config = match ChatConfig::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("genchat: {err}");
            std::process::exit(2);
        }
    };
    let use_color = config.use_color;

    let (mut session, mut events) = ChatSession::from_config(config)?;
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Flag for interrupt handling during a reveal
    let interrupted = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("Gemini Chat (model: {})", session.config().model);
    println!("Type /help for commands, /quit to exit\n");
    render_transcript(&mut renderer, session.conversation().snapshot().iter());

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let prompt = match session.pending_image() {
            Some(image) => format!("You [{}]: ", image.file_name),
            None => "You: ".to_string(),
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() && session.pending_image().is_none() {
                    continue;
                }
                if !trimmed.is_empty() {
                    let _ = rl.add_history_entry(trimmed);
                }

                // Check for slash commands
                if let Some(cmd) = parse_command(trimmed) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Image(path) => match session.attach_image(&path) {
                            Ok(image) => {
                                let marker = attachment_marker(image);
                                renderer.print_info(&format!("Attached {marker}"));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Detach => match session.detach_image() {
                            Some(image) => {
                                renderer.print_info(&format!("Removed {}", image.file_name))
                            }
                            None => renderer.print_info("No image attached."),
                        },
                        ChatCommand::Model(model_name) => match model_name.parse::<Model>() {
                            Ok(model) => {
                                session.set_model(model);
                                renderer.print_info(&format!("Model changed to: {}", model_name));
                            }
                            Err(err) => renderer.print_error(&err),
                        },
                        ChatCommand::Models => print_models(&session.config().model),
                        ChatCommand::WebSearch(enabled) => {
                            session.set_web_search(enabled);
                            if enabled {
                                renderer.print_info("Web search enabled.");
                            } else {
                                renderer.print_info("Web search disabled.");
                            }
                        }
                        ChatCommand::MaxTokens(value) => match session.set_max_tokens(value) {
                            Ok(()) => renderer.print_info(&format!("max_tokens set to {value}")),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Temperature(value) => match session.set_temperature(value) {
                            Ok(()) => {
                                renderer.print_info(&format!("temperature set to {:.2}", value))
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::History => {
                            render_transcript(
                                &mut renderer,
                                session.conversation().snapshot().iter(),
                            );
                        }
                        ChatCommand::Stats => {
                            println!("    Session Statistics:");
                            for line in session.stats().to_string().lines() {
                                println!("      {line}");
                            }
                        }
                        ChatCommand::ShowConfig => print_config(session.config()),
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to API
                let preview = Message::user(line.as_str(), session.pending_image().cloned());
                renderer.print_message(&preview);
                renderer.show_generating();
                let result = session.submit(&line).await;
                renderer.clear_generating();
                match result {
                    Ok(Some(report)) => {
                        type_reply(&mut session, &mut events, &mut renderer, &interrupted, &report)
                            .await;
                    }
                    Ok(None) => {}
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Prints a reply as the reveal task uncovers it.
///
/// Output is driven by the stored displayed prefix rather than the event
/// payloads, so stale events and a Ctrl+C skip can neither repeat nor drop
/// characters.
async fn type_reply(
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<RevealEvent>,
    renderer: &mut PlainTextRenderer,
    interrupted: &AtomicBool,
    report: &TurnReport,
) {
    let reply_id = report.reply_id;
    let Some(reply) = session.conversation().lock().get(reply_id).cloned() else {
        return;
    };
    renderer.start_reply(&reply);
    let mut printed = 0;

    loop {
        print_new(session, renderer, reply_id, &mut printed);
        if session
            .conversation()
            .lock()
            .get(reply_id)
            .is_none_or(|m| m.is_revealed())
        {
            break;
        }
        tokio::select! {
            event = events.recv() => {
                if event.is_none() {
                    break;
                }
            }
            _ = tokio::time::sleep(INTERRUPT_POLL) => {
                if interrupted.swap(false, Ordering::Relaxed) {
                    session.finish_reveal();
                }
            }
        }
    }

    renderer.finish_reply(&reply);
}

fn print_new(
    session: &ChatSession,
    renderer: &mut PlainTextRenderer,
    id: MessageId,
    printed: &mut usize,
) {
    let conversation = session.conversation().lock();
    let Some(message) = conversation.get(id) else {
        return;
    };
    let displayed = message.displayed_content();
    if displayed.len() > *printed {
        renderer.print_reveal(&displayed[*printed..]);
        *printed = displayed.len();
    }
}

fn print_models(current: &Model) {
    println!("    Known models:");
    for model in KnownModel::ALL {
        let marker = if *current == Model::Known(model) {
            "*"
        } else {
            " "
        };
        println!("    {marker} {:<26} {}", model.as_str(), model.label());
    }
    if let Model::Custom(name) = current {
        println!("    * {name} (custom)");
    }
}

fn print_config(config: &ChatConfig) {
    println!("    Current Configuration:");
    println!("      Model: {}", config.model);
    println!("      Max tokens: {}", config.max_tokens);
    println!("      Temperature: {:.2}", config.temperature);
    println!(
        "      Web search: {}",
        if config.web_search { "on" } else { "off" }
    );
    println!(
        "      Reveal interval: {} ms",
        config.reveal_interval.as_millis()
    );
    println!("      Timeout: {} s", config.timeout.as_secs());
    match &config.base_url {
        Some(url) => println!("      Base URL: {url}"),
        None => println!("      Base URL: (default)"),
    }
}
