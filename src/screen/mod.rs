//! Screen display module.
//!
//! Renders `&`-code chat markup as ANSI escape sequences, with a plain text
//! fallback for clients that do not understand them.

mod ansi;
mod plain;

pub use ansi::AnsiScreen;
pub use plain::PlainScreen;

use crate::chat::markup;

/// The sixteen markup colours, indexed by their hex code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// `&0`
    Black,
    /// `&1`
    DarkBlue,
    /// `&2`
    DarkGreen,
    /// `&3`
    DarkAqua,
    /// `&4`
    DarkRed,
    /// `&5`
    DarkPurple,
    /// `&6`
    Gold,
    /// `&7`
    Gray,
    /// `&8`
    DarkGray,
    /// `&9`
    Blue,
    /// `&a`
    Green,
    /// `&b`
    Aqua,
    /// `&c`
    Red,
    /// `&d`
    LightPurple,
    /// `&e`
    Yellow,
    /// `&f`
    White,
}

impl Color {
    const ALL: [Color; 16] = [
        Color::Black,
        Color::DarkBlue,
        Color::DarkGreen,
        Color::DarkAqua,
        Color::DarkRed,
        Color::DarkPurple,
        Color::Gold,
        Color::Gray,
        Color::DarkGray,
        Color::Blue,
        Color::Green,
        Color::Aqua,
        Color::Red,
        Color::LightPurple,
        Color::Yellow,
        Color::White,
    ];

    /// Look up a colour by its markup code character (`0`-`9`, `a`-`f`).
    pub fn from_code(code: char) -> Option<Color> {
        code.to_digit(16).map(|i| Self::ALL[i as usize])
    }

    /// Get the ANSI foreground code.
    ///
    /// Dark colours map to the standard range, bright ones to 90-97.
    pub fn fg_code(self) -> u8 {
        match self {
            Color::Black => 30,
            Color::DarkRed => 31,
            Color::DarkGreen => 32,
            Color::Gold => 33,
            Color::DarkBlue => 34,
            Color::DarkPurple => 35,
            Color::DarkAqua => 36,
            Color::Gray => 37,
            Color::DarkGray => 90,
            Color::Red => 91,
            Color::Green => 92,
            Color::Yellow => 93,
            Color::Blue => 94,
            Color::LightPurple => 95,
            Color::Aqua => 96,
            Color::White => 97,
        }
    }
}

/// Screen output trait for terminal decoration.
///
/// Implementations include `AnsiScreen` for ANSI-capable terminals and
/// `PlainScreen` for terminals without ANSI support.
pub trait Screen: Send + Sync {
    /// Set foreground (text) color.
    fn fg(&self, color: Color) -> String;

    /// Enable bold text.
    fn bold(&self) -> String;

    /// Enable italic text.
    fn italic(&self) -> String;

    /// Enable underlined text.
    fn underline(&self) -> String;

    /// Enable strikethrough text.
    fn strikethrough(&self) -> String;

    /// Reset all text attributes to default.
    fn reset(&self) -> String;

    /// Check if ANSI escape sequences are enabled.
    fn is_ansi_enabled(&self) -> bool;

    /// Render a markup line.
    ///
    /// # Arguments
    ///
    /// * `line` - Text containing `&` formatting codes.
    ///
    /// # Returns
    ///
    /// The visible text with this screen's escape sequences, ending in a reset
    /// when any style was emitted.
    fn render(&self, line: &str) -> String {
        let mut out = String::new();
        let mut styled = false;
        for span in markup::spans(line) {
            let style = span.style;
            let mut prefix = self.reset();
            if let Some(color) = style.color {
                prefix.push_str(&self.fg(color));
            }
            if style.bold {
                prefix.push_str(&self.bold());
            }
            if style.italic {
                prefix.push_str(&self.italic());
            }
            if style.underline {
                prefix.push_str(&self.underline());
            }
            if style.strikethrough {
                prefix.push_str(&self.strikethrough());
            }
            styled |= !prefix.is_empty();
            out.push_str(&prefix);
            out.push_str(&span.text);
        }
        if styled {
            out.push_str(&self.reset());
        }
        out
    }
}

/// Create a screen instance based on ANSI support.
///
/// # Example
///
/// ```
/// use parley::screen::{create_screen, Color};
///
/// let screen = create_screen(true);
/// assert!(screen.is_ansi_enabled());
/// assert!(!screen.fg(Color::Red).is_empty());
///
/// let plain = create_screen(false);
/// assert_eq!(plain.render("&cred &lalert"), "red alert");
/// ```
pub fn create_screen(ansi_enabled: bool) -> Box<dyn Screen> {
    if ansi_enabled {
        Box::new(AnsiScreen)
    } else {
        Box::new(PlainScreen)
    }
}
