//! Local (proximity) channel formatting.
//!
//! A trailing suffix picks the speech verb and effective range. Beyond the
//! effective range the message content fades character by character until it
//! is not delivered at all at `range * FADE_MULTIPLIER`.

use rand::Rng;

use super::format::FormattedMessageDetails;
use super::markup;
use crate::channel::ChannelDefinition;

/// How far beyond the effective range a message stays (partially) audible.
pub const FADE_MULTIPLIER: f64 = 2.0;

/// Filler replacing obscured characters.
pub const OBSCURE_GLYPH: char = '.';

/// Colour of the filler glyph.
pub const OBSCURE_COLOR: &str = "&8";

/// Colour of roleplay narration outside quotes.
const ROLEPLAY_NARRATION: &str = "&f&o";

/// Colour of quoted roleplay speech, quote marks included.
const ROLEPLAY_SPEECH: &str = "&7";

/// Speech mode selected by the message suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speech {
    /// `!!`
    Shout,
    /// `!`
    Exclaim,
    /// `*`
    Whisper,
    /// `$`
    Mutter,
    /// `+`
    Roleplay,
    /// No suffix.
    Say,
}

impl Speech {
    /// Split a message into its speech mode and trimmed content.
    pub fn parse(message: &str) -> (Speech, &str) {
        let (speech, rest) = if let Some(rest) = message.strip_suffix("!!") {
            (Speech::Shout, rest)
        } else if let Some(rest) = message.strip_suffix('!') {
            (Speech::Exclaim, rest)
        } else if let Some(rest) = message.strip_suffix('*') {
            (Speech::Whisper, rest)
        } else if let Some(rest) = message.strip_suffix('$') {
            (Speech::Mutter, rest)
        } else if let Some(rest) = message.strip_suffix('+') {
            (Speech::Roleplay, rest)
        } else {
            (Speech::Say, message)
        };
        (speech, rest.trim())
    }

    /// Effective delivery range.
    pub fn range(self) -> i32 {
        match self {
            Speech::Shout => 100,
            Speech::Exclaim => 75,
            Speech::Whisper => 10,
            Speech::Mutter => 3,
            Speech::Roleplay | Speech::Say => 50,
        }
    }

    /// Verb shown after the sender name. Roleplay has none.
    pub fn verb(self) -> Option<&'static str> {
        match self {
            Speech::Shout => Some("shouts:"),
            Speech::Exclaim => Some("exclaims:"),
            Speech::Whisper => Some("whispers:"),
            Speech::Mutter => Some("mutters:"),
            Speech::Roleplay => None,
            Speech::Say => Some("says:"),
        }
    }
}

/// Per-character obscure probability at `distance` for effective `range`.
///
/// `Some(0.0)` within range, `None` once the message is out of earshot.
pub fn obscure_probability(distance: f64, range: f64) -> Option<f64> {
    if distance <= range {
        return Some(0.0);
    }
    let limit = range * FADE_MULTIPLIER;
    if distance > limit {
        return None;
    }
    Some(((distance - range) / (limit - range)).clamp(0.0, 1.0))
}

/// Rebuild `content` with each character independently replaced by the filler
/// glyph with probability `p`. Kept characters use `color`.
pub fn obscure_content<R: Rng + ?Sized>(content: &str, color: &str, p: f64, rng: &mut R) -> String {
    let p = p.clamp(0.0, 1.0);
    let mut out = String::with_capacity(content.len() * 3);
    for c in content.chars() {
        if rng.random_bool(p) {
            out.push_str(OBSCURE_COLOR);
            out.push(OBSCURE_GLYPH);
        } else {
            out.push_str(color);
            out.push(c);
        }
    }
    out
}

/// Render roleplay narration with quoted speech set apart.
pub fn render_roleplay(content: &str) -> String {
    let mut out = String::new();
    let mut in_quote = false;
    let mut segment = String::new();

    let flush = |out: &mut String, segment: &mut String, in_quote: bool| {
        if !segment.is_empty() {
            out.push_str(if in_quote {
                ROLEPLAY_SPEECH
            } else {
                ROLEPLAY_NARRATION
            });
            out.push_str(segment);
            segment.clear();
        }
    };

    for c in content.chars() {
        if c == '"' {
            flush(&mut out, &mut segment, in_quote);
            out.push_str(ROLEPLAY_SPEECH);
            out.push('"');
            in_quote = !in_quote;
        } else {
            segment.push(c);
        }
    }
    flush(&mut out, &mut segment, in_quote);
    out
}

/// Format a message for a local channel.
pub fn format_local_message(
    channel: &ChannelDefinition,
    sender_name: &str,
    message: &str,
) -> FormattedMessageDetails {
    let (speech, content) = Speech::parse(message);

    let mut header = format!(
        "{} {}{}&r ",
        channel.display_prefix, channel.name_color, sender_name
    );
    if let Some(verb) = speech.verb() {
        header.push_str(verb);
        header.push(' ');
    }

    let roleplay = speech == Speech::Roleplay;
    let rendered = if roleplay {
        render_roleplay(content)
    } else {
        format!("{}{}", channel.message_color, content)
    };

    FormattedMessageDetails {
        header,
        content: rendered,
        plain_content: markup::strip_codes(content),
        effective_range: speech.range(),
        roleplay,
        local: true,
        message_color: channel.message_color.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn local() -> ChannelDefinition {
        ChannelDefinition::new("local", "l", "&b[L]")
            .with_range(50)
            .with_message_color("&7")
            .with_name_color("&e")
            .with_special_type("local")
    }

    #[test]
    fn test_suffix_table() {
        assert_eq!(Speech::parse("hi!!"), (Speech::Shout, "hi"));
        assert_eq!(Speech::parse("hi!"), (Speech::Exclaim, "hi"));
        assert_eq!(Speech::parse("hi*"), (Speech::Whisper, "hi"));
        assert_eq!(Speech::parse("hi$"), (Speech::Mutter, "hi"));
        assert_eq!(Speech::parse("waves+"), (Speech::Roleplay, "waves"));
        assert_eq!(Speech::parse("hi"), (Speech::Say, "hi"));
    }

    #[test]
    fn test_suffix_content_trimmed() {
        assert_eq!(Speech::parse("  hello there !"), (Speech::Exclaim, "hello there"));
        assert_eq!(Speech::parse("hi!!!"), (Speech::Shout, "hi!"));
    }

    #[test]
    fn test_ranges_and_verbs() {
        assert_eq!(Speech::Shout.range(), 100);
        assert_eq!(Speech::Exclaim.range(), 75);
        assert_eq!(Speech::Whisper.range(), 10);
        assert_eq!(Speech::Mutter.range(), 3);
        assert_eq!(Speech::Roleplay.range(), 50);
        assert_eq!(Speech::Say.range(), 50);
        assert_eq!(Speech::Say.verb(), Some("says:"));
        assert_eq!(Speech::Roleplay.verb(), None);
    }

    #[test]
    fn test_obscure_probability_boundaries() {
        assert_eq!(obscure_probability(0.0, 50.0), Some(0.0));
        assert_eq!(obscure_probability(50.0, 50.0), Some(0.0));
        assert_eq!(obscure_probability(75.0, 50.0), Some(0.5));
        assert_eq!(obscure_probability(100.0, 50.0), Some(1.0));
        assert_eq!(obscure_probability(100.1, 50.0), None);
    }

    #[test]
    fn test_obscure_probability_zero_range() {
        assert_eq!(obscure_probability(0.0, 0.0), Some(0.0));
        assert_eq!(obscure_probability(0.5, 0.0), None);
    }

    #[test]
    fn test_obscure_probability_monotonic() {
        let mut last = 0.0;
        for step in 1..=100 {
            let d = 50.0 + step as f64 * 0.5;
            let p = obscure_probability(d, 50.0).unwrap();
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_obscure_content_extremes() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(obscure_content("abc", "&7", 0.0, &mut rng), "&7a&7b&7c");
        assert_eq!(obscure_content("abc", "&7", 1.0, &mut rng), "&8.&8.&8.");
    }

    #[test]
    fn test_obscure_content_fraction() {
        let mut rng = StdRng::seed_from_u64(42);
        let content = "x".repeat(2000);
        let out = obscure_content(&content, "&7", 0.5, &mut rng);
        let hidden = out.matches("&8.").count();
        assert!(hidden > 850 && hidden < 1150, "hidden = {hidden}");
    }

    #[test]
    fn test_roleplay_rendering() {
        let out = render_roleplay(r#"waves "hello" slowly"#);
        assert_eq!(out, "&f&owaves &7\"&7hello&7\"&f&o slowly");
    }

    #[test]
    fn test_roleplay_unclosed_quote() {
        assert_eq!(render_roleplay("nods \"ok"), "&f&onods &7\"&7ok");
    }

    #[test]
    fn test_format_local_exclaim() {
        let details = format_local_message(&local(), "Alice", "hello!");
        assert_eq!(details.header, "&b[L] &eAlice&r exclaims: ");
        assert_eq!(details.content, "&7hello");
        assert_eq!(details.plain_content, "hello");
        assert_eq!(details.effective_range, 75);
        assert!(!details.roleplay);
        assert!(details.local);
    }

    #[test]
    fn test_format_local_roleplay() {
        let details = format_local_message(&local(), "Alice", "waves+");
        assert_eq!(details.header, "&b[L] &eAlice&r ");
        assert!(details.roleplay);
        assert_eq!(details.content, "&f&owaves");
    }
}
