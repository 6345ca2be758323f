//! `&`-code markup.
//!
//! Rendered chat lines carry legacy formatting codes: `&0`-`&f` select a
//! colour and reset styles, `&k`-`&o` add a style, `&r` resets everything.
//! Codes are case-insensitive. An `&` not followed by a valid code is literal.

use crate::screen::Color;

/// Character introducing a formatting code.
pub const CODE_CHAR: char = '&';

/// Accumulated text style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub color: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

enum Code {
    Color(Color),
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Obfuscated,
    Reset,
}

fn code_for(c: char) -> Option<Code> {
    let lower = c.to_ascii_lowercase();
    if let Some(color) = Color::from_code(lower) {
        return Some(Code::Color(color));
    }
    match lower {
        'k' => Some(Code::Obfuscated),
        'l' => Some(Code::Bold),
        'm' => Some(Code::Strikethrough),
        'n' => Some(Code::Underline),
        'o' => Some(Code::Italic),
        'r' => Some(Code::Reset),
        _ => None,
    }
}

impl Style {
    fn apply(&mut self, code: Code) {
        match code {
            Code::Color(color) => {
                *self = Style {
                    color: Some(color),
                    ..Style::default()
                }
            }
            Code::Bold => self.bold = true,
            Code::Italic => self.italic = true,
            Code::Underline => self.underline = true,
            Code::Strikethrough => self.strikethrough = true,
            Code::Obfuscated => self.obfuscated = true,
            Code::Reset => *self = Style::default(),
        }
    }
}

/// Parse markup into styled spans. Empty runs are omitted.
pub fn spans(text: &str) -> Vec<Span> {
    let mut result = Vec::new();
    let mut style = Style::default();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == CODE_CHAR {
            if let Some(code) = chars.peek().copied().and_then(code_for) {
                chars.next();
                if !current.is_empty() {
                    result.push(Span {
                        text: std::mem::take(&mut current),
                        style,
                    });
                }
                style.apply(code);
                continue;
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        result.push(Span {
            text: current,
            style,
        });
    }
    result
}

/// Remove every formatting code.
pub fn strip_codes(text: &str) -> String {
    spans(text).into_iter().map(|s| s.text).collect()
}

/// Number of visible characters.
pub fn visible_len(text: &str) -> usize {
    spans(text).iter().map(|s| s.text.chars().count()).sum()
}

/// Cut markup down to at most `max` visible characters, keeping codes.
pub fn truncate_visible(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == CODE_CHAR {
            if let Some(&next) = chars.peek() {
                if code_for(next).is_some() {
                    chars.next();
                    out.push(c);
                    out.push(next);
                    continue;
                }
            }
        }
        if count == max {
            break;
        }
        out.push(c);
        count += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let result = spans("hello");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "hello");
        assert_eq!(result[0].style, Style::default());
    }

    #[test]
    fn test_color_resets_styles() {
        let result = spans("&l&cbold red&aplain green");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].style.color, Some(Color::Red));
        assert!(result[0].style.bold);
        assert_eq!(result[1].style.color, Some(Color::Green));
        assert!(!result[1].style.bold);
    }

    #[test]
    fn test_style_stacks_on_color() {
        let result = spans("&f&oitalic");
        assert_eq!(result[0].style.color, Some(Color::White));
        assert!(result[0].style.italic);
    }

    #[test]
    fn test_reset() {
        let result = spans("&c&lred&rplain");
        assert_eq!(result[1].style, Style::default());
    }

    #[test]
    fn test_uppercase_codes() {
        assert_eq!(spans("&Chi")[0].style.color, Some(Color::Red));
    }

    #[test]
    fn test_literal_ampersand() {
        assert_eq!(strip_codes("R&D &"), "R&D &");
        assert_eq!(strip_codes("&&a"), "&");
    }

    #[test]
    fn test_strip_codes() {
        assert_eq!(strip_codes("&a[G] &fAlice&f: &fhi"), "[G] Alice: hi");
    }

    #[test]
    fn test_visible_len() {
        assert_eq!(visible_len("&aab&lc"), 3);
    }

    #[test]
    fn test_truncate_visible() {
        assert_eq!(truncate_visible("&aabc&bdef", 4), "&aabc&bd");
        assert_eq!(truncate_visible("abc", 10), "abc");
        assert_eq!(truncate_visible("abc", 0), "");
    }
}
