//! Terminal presentation of the conversation.
//!
//! This module provides the renderer trait and a plain-text implementation
//! that lays messages out as bubbles: user messages right-aligned, assistant
//! replies on the left, with an optional typing cursor during a reveal.

use std::io::{self, Stdout, Write};

use time::OffsetDateTime;
use time::macros::format_description;

use crate::types::{ImageAttachment, Message};

/// ANSI escape code for dim text (used for the generating indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for blue text (used for user messages).
const ANSI_BLUE: &str = "\x1b[34m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for failed turns).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for magenta text (used for attachment markers).
const ANSI_MAGENTA: &str = "\x1b[35m";

/// Erases from the cursor to the end of the line.
const ANSI_CLEAR_EOL: &str = "\x1b[K";

/// Block cursor shown while a reply is being revealed.
pub const TYPING_CURSOR: char = '█';

/// Text of the in-flight indicator.
pub const GENERATING_TEXT: &str = "Generating response...";

const DEFAULT_WIDTH: usize = 80;

/// Trait for rendering the conversation.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print a complete message as a bubble.
    fn print_message(&mut self, message: &Message);

    /// Begin an assistant bubble whose text will arrive through `print_reveal`.
    fn start_reply(&mut self, message: &Message);

    /// Print the next revealed characters of the current reply.
    fn print_reveal(&mut self, chunk: &str);

    /// Close the current reply bubble.
    fn finish_reply(&mut self, message: &Message);

    /// Show the transient indicator while a request is in flight.
    fn show_generating(&mut self);

    /// Remove the in-flight indicator.
    fn clear_generating(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    width: usize,
    cursor_shown: bool,
    generating_shown: bool,
    in_failed_reply: bool,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    ///
    /// The bubble width comes from `COLUMNS` when it is set.
    pub fn with_color(use_color: bool) -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|cols| cols.parse::<usize>().ok())
            .filter(|cols| *cols >= 20)
            .unwrap_or(DEFAULT_WIDTH);
        Self::with_writer(io::stdout(), use_color, width)
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer over an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool, width: usize) -> Self {
        Self {
            out,
            use_color,
            width: width.max(20),
            cursor_shown: false,
            generating_shown: false,
            in_failed_reply: false,
        }
    }

    /// Consumes the renderer, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
    }

    /// Flushes to ensure immediate display of revealed content.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    /// Widest a bubble line may be.
    fn bubble_width(&self) -> usize {
        (self.width * 4 / 5).max(10)
    }

    fn hide_cursor(&mut self) {
        if self.cursor_shown {
            self.write(&format!("\x08{ANSI_CLEAR_EOL}"));
            self.cursor_shown = false;
        }
    }

    fn label(&self, message: &Message) -> String {
        let stamp = format_timestamp(message.created_at);
        if message.is_user() {
            self.styled(&format!("{ANSI_BOLD}{ANSI_BLUE}"), &format!("You [{stamp}]"))
        } else if message.failed {
            self.styled(&format!("{ANSI_BOLD}{ANSI_RED}"), &format!("Assistant [{stamp}]"))
        } else {
            self.styled(&format!("{ANSI_BOLD}{ANSI_CYAN}"), &format!("Assistant [{stamp}]"))
        }
    }

    fn print_user(&mut self, message: &Message) {
        let width = self.width;
        let label = self.label(message);
        let label_len = format!("You [{}]", format_timestamp(message.created_at))
            .chars()
            .count();
        self.write(&format!("{}{label}\n", pad(width, label_len)));
        if let Some(image) = &message.image {
            let marker = attachment_marker(image);
            let styled = self.styled(ANSI_MAGENTA, &marker);
            self.write(&format!("{}{styled}\n", pad(width, marker.chars().count())));
        }
        for line in wrap(message.content(), self.bubble_width()) {
            let styled = self.styled(ANSI_BLUE, &line);
            self.write(&format!("{}{styled}\n", pad(width, line.chars().count())));
        }
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_message(&mut self, message: &Message) {
        self.hide_cursor();
        if message.is_user() {
            self.print_user(message);
        } else {
            let label = self.label(message);
            self.write(&format!("{label}\n"));
            let color = if message.failed { ANSI_RED } else { "" };
            for line in wrap(message.displayed_content(), self.bubble_width()) {
                let line = if color.is_empty() {
                    line
                } else {
                    self.styled(color, &line)
                };
                self.write(&format!("{line}\n"));
            }
        }
        self.write("\n");
        self.flush();
    }

    fn start_reply(&mut self, message: &Message) {
        self.hide_cursor();
        let label = self.label(message);
        self.write(&format!("{label}\n"));
        self.in_failed_reply = message.failed;
        if self.use_color && message.failed {
            self.write(ANSI_RED);
        }
        self.flush();
    }

    fn print_reveal(&mut self, chunk: &str) {
        self.hide_cursor();
        self.write(chunk);
        if self.use_color {
            self.write(&TYPING_CURSOR.to_string());
            self.cursor_shown = true;
        }
        self.flush();
    }

    fn finish_reply(&mut self, _message: &Message) {
        self.hide_cursor();
        if self.use_color && self.in_failed_reply {
            self.write(ANSI_RESET);
        }
        self.in_failed_reply = false;
        self.write("\n\n");
        self.flush();
    }

    fn show_generating(&mut self) {
        if self.generating_shown {
            return;
        }
        let text = self.styled(ANSI_DIM, GENERATING_TEXT);
        if self.use_color {
            self.write(&text);
        } else {
            self.write(&format!("{text}\n"));
        }
        self.generating_shown = true;
        self.flush();
    }

    fn clear_generating(&mut self) {
        if !self.generating_shown {
            return;
        }
        if self.use_color {
            self.write(&format!("\r{ANSI_CLEAR_EOL}"));
        }
        self.generating_shown = false;
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.hide_cursor();
        let text = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write(&format!("{text}\n"));
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.hide_cursor();
        self.write(&format!("{info}\n"));
        self.flush();
    }
}

/// Renders every message, oldest first.
pub fn render_transcript<'a>(
    renderer: &mut dyn Renderer,
    messages: impl IntoIterator<Item = &'a Message>,
) {
    for message in messages {
        renderer.print_message(message);
    }
}

/// Describes an attachment where a thumbnail would go.
pub fn attachment_marker(image: &ImageAttachment) -> String {
    format!(
        "[image: {} ({}, {})]",
        image.file_name,
        image.media_type,
        human_size(image.size)
    )
}

fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{bytes} B")
    } else if bytes_f < KIB * KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    }
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

fn pad(width: usize, len: usize) -> String {
    " ".repeat(width.saturating_sub(len))
}

/// Splits `text` into lines no wider than `width` characters, preferring to
/// break at spaces.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;
        for word in raw.split(' ') {
            let word_len = word.chars().count();
            let needed = if current_len == 0 {
                word_len
            } else {
                current_len + 1 + word_len
            };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(word);
                current_len += word_len;
                continue;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let mut chars = word.chars().peekable();
            while chars.peek().is_some() {
                let piece: String = chars.by_ref().take(width).collect();
                let piece_len = piece.chars().count();
                if piece_len == width && chars.peek().is_some() {
                    lines.push(piece);
                } else {
                    current = piece;
                    current_len = piece_len;
                }
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageMediaType;

    fn output(renderer: PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn wrap_prefers_spaces() {
        assert_eq!(wrap("the quick brown fox", 9), vec!["the quick", "brown fox"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("one\n\ntwo", 10), vec!["one", "", "two"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn user_bubbles_are_right_aligned() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false, 40);
        renderer.print_message(&Message::user("hello", None));
        let out = output(renderer);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].trim_start().starts_with("You ["));
        assert_eq!(lines[1], format!("{}hello", " ".repeat(35)));
    }

    #[test]
    fn user_image_marker_is_shown() {
        let image = ImageAttachment::from_bytes("cat.png", ImageMediaType::Png, &[0u8; 2048]).unwrap();
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false, 60);
        renderer.print_message(&Message::user("look", Some(image)));
        assert!(output(renderer).contains("[image: cat.png (image/png, 2.0 KiB)]"));
    }

    #[test]
    fn assistant_bubbles_show_displayed_prefix() {
        let mut message = Message::assistant("Hi there");
        message.advance_reveal();
        message.advance_reveal();
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false, 40);
        renderer.print_message(&message);
        let out = output(renderer);
        assert!(out.starts_with("Assistant ["));
        assert!(out.contains("\nHi\n"));
        assert!(!out.contains("there"));
    }

    #[test]
    fn reveal_without_color_has_no_cursor() {
        let message = Message::assistant("ok");
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false, 40);
        renderer.start_reply(&message);
        renderer.print_reveal("o");
        renderer.print_reveal("k");
        renderer.finish_reply(&message);
        let out = output(renderer);
        assert!(out.ends_with("\nok\n\n"));
        assert!(!out.contains(TYPING_CURSOR));
    }

    #[test]
    fn reveal_with_color_trails_a_cursor() {
        let message = Message::assistant("ok");
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), true, 40);
        renderer.start_reply(&message);
        renderer.print_reveal("o");
        renderer.print_reveal("k");
        renderer.finish_reply(&message);
        let out = output(renderer);
        assert!(out.contains(&format!("o{TYPING_CURSOR}\x08{ANSI_CLEAR_EOL}k")));
        assert!(out.ends_with(&format!("k{TYPING_CURSOR}\x08{ANSI_CLEAR_EOL}\n\n")));
    }

    #[test]
    fn generating_indicator_toggles() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), true, 40);
        renderer.show_generating();
        renderer.show_generating();
        renderer.clear_generating();
        renderer.clear_generating();
        let out = output(renderer);
        assert_eq!(out.matches(GENERATING_TEXT).count(), 1);
        assert_eq!(out.matches('\r').count(), 1);
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
