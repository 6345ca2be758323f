//! Channel definition type.

/// Range value meaning "no distance limit".
pub const UNBOUNDED_RANGE: i32 = -1;

/// Special type tag selecting the local (proximity) formatter.
pub const LOCAL_SPECIAL_TYPE: &str = "local";

/// Default message color.
const DEFAULT_MESSAGE_COLOR: &str = "&f";

/// Default separator between sender name and message.
const DEFAULT_SEPARATOR: &str = ": ";

/// A configured chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDefinition {
    /// Unique channel name.
    pub name: String,
    /// Unique, case-sensitive shortcut typed before the prefix separator.
    pub shortcut: String,
    /// Prefix shown in front of every message (markup).
    pub display_prefix: String,
    /// Permission node; `None` means public.
    pub permission: Option<String>,
    /// Delivery range, or [`UNBOUNDED_RANGE`].
    pub range: i32,
    /// Color of the sender name.
    pub name_color: String,
    /// Separator between name and message.
    pub separator: String,
    /// Color of the separator.
    pub separator_color: String,
    /// Color of the message content.
    pub message_color: String,
    /// Always-on channels ignore permissions and cannot be left.
    pub always_on: bool,
    /// Optional tag selecting an alternate formatter.
    pub special_type: Option<String>,
}

impl ChannelDefinition {
    /// Create a public, unbounded channel with default colors.
    pub fn new(
        name: impl Into<String>,
        shortcut: impl Into<String>,
        display_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            shortcut: shortcut.into(),
            display_prefix: display_prefix.into(),
            permission: None,
            range: UNBOUNDED_RANGE,
            name_color: DEFAULT_MESSAGE_COLOR.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            separator_color: DEFAULT_MESSAGE_COLOR.to_string(),
            message_color: DEFAULT_MESSAGE_COLOR.to_string(),
            always_on: false,
            special_type: None,
        }
    }

    /// Require a permission node. Empty nodes leave the channel public.
    pub fn with_permission(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        self.permission = if node.is_empty() { None } else { Some(node) };
        self
    }

    /// Set the delivery range.
    pub fn with_range(mut self, range: i32) -> Self {
        self.range = range;
        self
    }

    /// Set the message color. Name and separator colors follow it.
    pub fn with_message_color(mut self, color: impl Into<String>) -> Self {
        let color = color.into();
        self.name_color = color.clone();
        self.separator_color = color.clone();
        self.message_color = color;
        self
    }

    /// Set the sender name color.
    pub fn with_name_color(mut self, color: impl Into<String>) -> Self {
        self.name_color = color.into();
        self
    }

    /// Set the separator and its color.
    pub fn with_separator(mut self, separator: impl Into<String>, color: impl Into<String>) -> Self {
        self.separator = separator.into();
        self.separator_color = color.into();
        self
    }

    /// Mark the channel always-on.
    pub fn always_on(mut self) -> Self {
        self.always_on = true;
        self
    }

    /// Set the special type tag.
    pub fn with_special_type(mut self, special_type: impl Into<String>) -> Self {
        let special_type = special_type.into();
        self.special_type = if special_type.is_empty() {
            None
        } else {
            Some(special_type)
        };
        self
    }

    /// Permission node that gates this channel, if any.
    ///
    /// Always-on channels never require one.
    pub fn required_permission(&self) -> Option<&str> {
        if self.always_on {
            None
        } else {
            self.permission.as_deref()
        }
    }

    /// Whether the channel has no distance limit.
    pub fn is_global(&self) -> bool {
        self.range < 0
    }

    /// Whether the channel uses the local formatter.
    pub fn is_local(&self) -> bool {
        self.special_type.as_deref() == Some(LOCAL_SPECIAL_TYPE)
    }

    /// Display label: prefix followed by the name.
    pub fn label(&self) -> String {
        format!("{} {}", self.display_prefix, self.name)
    }
}
