//! Output sinks.

use std::io::Write;

use futures_util::StreamExt;
use owo_colors::{AnsiColors, OwoColorize};

use crate::completion::Fragments;
use crate::Error;

/// Consumes a fragment stream and renders it.
pub trait Printer {
    /// Drains `fragments`, rendering them along the way, and returns the
    /// concatenated text.
    ///
    /// The stream is always consumed to its end, unless it fails.
    fn print(
        &mut self,
        fragments: Fragments,
    ) -> impl Future<Output = Result<String, Error>>;
}

/// Prints plain text to a writer, optionally coloured.
///
/// In live mode, every fragment is written and flushed as soon as it
/// arrives. Otherwise the text is written once, after the stream ended.
#[derive(Debug)]
pub struct TextPrinter<W> {
    writer: W,
    color: Option<AnsiColors>,
    live: bool,
}

impl<W: Write> TextPrinter<W> {
    /// Creates a live, uncoloured printer.
    #[inline]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            color: None,
            live: true,
        }
    }

    /// Sets the colour of the text.
    #[inline]
    pub fn with_color(mut self, color: Option<AnsiColors>) -> Self {
        self.color = color;
        self
    }

    /// Sets whether fragments are printed as they arrive.
    #[inline]
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Consumes the printer, returning the writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_text(&mut self, text: &str) -> std::io::Result<()> {
        match self.color {
            Some(color) => write!(self.writer, "{}", text.color(color))?,
            None => self.writer.write_all(text.as_bytes())?,
        }
        self.writer.flush()
    }
}

impl<W: Write> Printer for TextPrinter<W> {
    async fn print(&mut self, mut fragments: Fragments) -> Result<String, Error> {
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if self.live {
                self.write_text(&fragment)?;
            }
            text.push_str(&fragment);
        }
        if !self.live {
            self.write_text(&text)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(text)
    }
}

/// Parses a colour name like `magenta` or `bright_blue`.
pub fn parse_color(name: &str) -> Option<AnsiColors> {
    let color = match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "black" => AnsiColors::Black,
        "red" => AnsiColors::Red,
        "green" => AnsiColors::Green,
        "yellow" => AnsiColors::Yellow,
        "blue" => AnsiColors::Blue,
        "magenta" => AnsiColors::Magenta,
        "cyan" => AnsiColors::Cyan,
        "white" => AnsiColors::White,
        "bright_black" => AnsiColors::BrightBlack,
        "bright_red" => AnsiColors::BrightRed,
        "bright_green" => AnsiColors::BrightGreen,
        "bright_yellow" => AnsiColors::BrightYellow,
        "bright_blue" => AnsiColors::BrightBlue,
        "bright_magenta" => AnsiColors::BrightMagenta,
        "bright_cyan" => AnsiColors::BrightCyan,
        "bright_white" => AnsiColors::BrightWhite,
        _ => return None,
    };
    Some(color)
}
