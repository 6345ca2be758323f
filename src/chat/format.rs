//! Message formatting.
//!
//! Every rendered line is `&`-code markup; the front end decides how to show
//! it. Channel messages carry enough detail for per-recipient range handling.

use rand::Rng;

use super::local::{self, FADE_MULTIPLIER, OBSCURE_COLOR};
use super::markup;
use crate::channel::ChannelDefinition;

/// Colour of system notices.
pub const NOTICE_COLOR: &str = "&e";

/// Colour of error notices.
pub const ERROR_COLOR: &str = "&c";

/// Marker appended to truncated relay messages.
pub const TRUNCATION_MARKER: &str = "...";

/// How far a message travels from its sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reach {
    /// Every eligible member receives it.
    Unbounded,
    /// Delivered unmodified up to the distance, dropped beyond.
    Cutoff(f64),
    /// Unmodified within the range, fading up to `range * FADE_MULTIPLIER`.
    Fading(f64),
}

/// One outbound channel message, rendered once and delivered many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessageDetails {
    /// Prefix, sender name and verb or separator.
    pub header: String,
    /// Rendered content.
    pub content: String,
    /// Content without markup, used when obscuring.
    pub plain_content: String,
    /// Range for this send. Negative means unbounded.
    pub effective_range: i32,
    /// Roleplay messages are never obscured.
    pub roleplay: bool,
    /// Formatted by the local formatter.
    pub local: bool,
    /// Channel message colour, kept for obscured characters.
    pub message_color: String,
}

impl FormattedMessageDetails {
    /// The unmodified line.
    pub fn full_line(&self) -> String {
        format!("{}{}", self.header, self.content)
    }

    /// Distance policy for this message.
    pub fn reach(&self) -> Reach {
        if self.effective_range < 0 {
            return Reach::Unbounded;
        }
        let range = f64::from(self.effective_range);
        match (self.local, self.roleplay) {
            (true, false) => Reach::Fading(range),
            (true, true) => Reach::Cutoff(range * FADE_MULTIPLIER),
            (false, _) => Reach::Cutoff(range),
        }
    }

    /// Line delivered to a recipient at `distance`, or `None` if out of reach.
    pub fn line_for_distance<R: Rng + ?Sized>(&self, distance: f64, rng: &mut R) -> Option<String> {
        match self.reach() {
            Reach::Unbounded => Some(self.full_line()),
            Reach::Cutoff(max) => (distance <= max).then(|| self.full_line()),
            Reach::Fading(range) => {
                let p = local::obscure_probability(distance, range)?;
                if p <= 0.0 {
                    return Some(self.full_line());
                }
                let obscured =
                    local::obscure_content(&self.plain_content, &self.message_color, p, rng);
                Some(format!("{}{}", self.header, obscured))
            }
        }
    }
}

/// Format a channel message with the channel's formatter.
pub fn format_channel_message(
    channel: &ChannelDefinition,
    sender_name: &str,
    message: &str,
) -> FormattedMessageDetails {
    if channel.is_local() {
        local::format_local_message(channel, sender_name, message)
    } else {
        format_standard_message(channel, sender_name, message)
    }
}

/// `prefix name<separator>content` with the channel colours.
pub fn format_standard_message(
    channel: &ChannelDefinition,
    sender_name: &str,
    message: &str,
) -> FormattedMessageDetails {
    FormattedMessageDetails {
        header: format!(
            "{} {}{}{}{}",
            channel.display_prefix,
            channel.name_color,
            sender_name,
            channel.separator_color,
            channel.separator
        ),
        content: format!("{}{}", channel.message_color, message),
        plain_content: markup::strip_codes(message),
        effective_range: channel.range,
        roleplay: false,
        local: false,
        message_color: channel.message_color.clone(),
    }
}

/// Direct message as seen by its sender.
pub fn format_dm_sent(target_name: &str, message: &str) -> String {
    format!("&d[You -> &e{target_name}&d]: &f{message}")
}

/// Direct message as seen by its recipient.
pub fn format_dm_received(sender_name: &str, message: &str) -> String {
    format!("&d[&e{sender_name}&d -> You]: &f{message}")
}

/// Line for a message arriving from the relay bridge.
///
/// The visible length is capped at `max_length`; longer content is cut and
/// followed by a muted marker.
pub fn format_relay_inbound(
    prefix: &str,
    author: &str,
    separator: &str,
    content: &str,
    max_length: usize,
) -> String {
    let mut line = String::new();
    if !prefix.is_empty() {
        line.push_str(prefix);
        line.push(' ');
    }
    line.push_str(author);
    line.push_str(separator);

    let used = markup::visible_len(&line);
    let marker_len = TRUNCATION_MARKER.chars().count();
    let content_len = markup::visible_len(content);
    let room = max_length.saturating_sub(used + marker_len);

    if used + content_len <= max_length {
        line.push_str(content);
    } else if room > 0 {
        line.push_str(&markup::truncate_visible(content, room));
        line.push_str(OBSCURE_COLOR);
        line.push_str(TRUNCATION_MARKER);
    } else if max_length.saturating_sub(used) >= marker_len {
        line.push_str(OBSCURE_COLOR);
        line.push_str(TRUNCATION_MARKER);
    }
    line
}

/// Plain line sent to the relay bridge.
pub fn format_relay_outbound(sender_name: &str, message: &str) -> String {
    format!(
        "{}: {}",
        markup::strip_codes(sender_name),
        markup::strip_codes(message)
    )
}

/// System notice.
pub fn notice(text: &str) -> String {
    format!("{NOTICE_COLOR}{text}")
}

/// Error notice.
pub fn error_notice(text: &str) -> String {
    format!("{ERROR_COLOR}{text}")
}
