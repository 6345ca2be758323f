//! Plain text screen implementation.
//!
//! Every sequence is empty, so rendering leaves only the visible text.

use super::{Color, Screen};

/// Plain text screen implementation (no ANSI support).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainScreen;

impl PlainScreen {
    /// Create a new plain screen.
    pub fn new() -> Self {
        Self
    }
}

impl Screen for PlainScreen {
    fn fg(&self, _color: Color) -> String {
        String::new()
    }

    fn bold(&self) -> String {
        String::new()
    }

    fn italic(&self) -> String {
        String::new()
    }

    fn underline(&self) -> String {
        String::new()
    }

    fn strikethrough(&self) -> String {
        String::new()
    }

    fn reset(&self) -> String {
        String::new()
    }

    fn is_ansi_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_screen_sequences_empty() {
        let screen = PlainScreen::new();
        assert!(!screen.is_ansi_enabled());
        assert_eq!(screen.fg(Color::Red), "");
        assert_eq!(screen.bold(), "");
        assert_eq!(screen.reset(), "");
    }

    #[test]
    fn test_render_keeps_literal_ampersand() {
        let screen = PlainScreen::new();
        assert_eq!(screen.render("&7R&D"), "R&D");
    }
}
