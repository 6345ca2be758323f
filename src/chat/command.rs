//! Chat command parser and handlers.
//!
//! Lines starting with `/` are commands; anything else is routed by
//! [`ChatCore::handle_chat`]. Each command maps onto one core operation and
//! reports its result to the user as notices.

use tracing::debug;

use super::outbox::Outbox;
use super::presence::{Position, UserId};
use super::service::{ChatCore, ChatSettings, JoinOutcome};
use crate::error::ChatError;

/// Result of parsing a chat input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatInput {
    /// Regular chat message.
    Message(String),
    /// Parsed command.
    Command(ChatCommand),
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// List channels and the caller's membership.
    Channels,
    /// Show help message.
    Help,
    /// Focus a channel.
    Focus(String),
    /// Join a channel.
    Join(String),
    /// Leave a channel, or the focused one.
    Leave(Option<String>),
    /// Focus a user for direct messages and optionally send one.
    Msg {
        target: String,
        message: Option<String>,
    },
    /// Reply to the last direct message, or focus its sender.
    Reply(Option<String>),
    /// List connected users.
    Who,
    /// Set the caller's position.
    Move(Position),
    /// Disconnect.
    Quit,
    /// Missing or malformed arguments; carries the expected syntax.
    Usage(&'static str),
    /// Unknown command.
    Unknown(String),
}

impl ChatCommand {
    /// Get the command name.
    pub fn name(&self) -> &str {
        match self {
            ChatCommand::Channels => "channels",
            ChatCommand::Help => "help",
            ChatCommand::Focus(_) => "focus",
            ChatCommand::Join(_) => "join",
            ChatCommand::Leave(_) => "leave",
            ChatCommand::Msg { .. } => "msg",
            ChatCommand::Reply(_) => "r",
            ChatCommand::Who => "who",
            ChatCommand::Move(_) => "pos",
            ChatCommand::Quit => "quit",
            ChatCommand::Usage(_) => "usage",
            ChatCommand::Unknown(cmd) => cmd,
        }
    }
}

/// What the session should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep reading input.
    Continue,
    /// Close the session.
    Quit,
}

const FOCUS_USAGE: &str = "/focus <channel>";
const JOIN_USAGE: &str = "/join <channel>";
const MSG_USAGE: &str = "/msg <user> [message]";
const POS_USAGE: &str = "/pos <x> <y> <z>";
const CHANNEL_USAGE: &str = "/channel <list|help|focus|join|leave> [channel]";

fn split_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim()),
        None => (text, ""),
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn required(text: &str, usage: &'static str, build: fn(String) -> ChatCommand) -> ChatCommand {
    match split_word(text).0 {
        "" => ChatCommand::Usage(usage),
        word => build(word.to_string()),
    }
}

fn parse_position(args: &str) -> ChatCommand {
    let coords: Vec<f64> = args
        .split_whitespace()
        .map_while(|c| c.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect();
    match coords.as_slice() {
        [x, y, z] if args.split_whitespace().count() == 3 => {
            ChatCommand::Move(Position::new(*x, *y, *z))
        }
        _ => ChatCommand::Usage(POS_USAGE),
    }
}

fn parse_channel_subcommand(args: &str) -> ChatCommand {
    let (sub, rest) = split_word(args);
    match sub.to_lowercase().as_str() {
        "list" => ChatCommand::Channels,
        "help" => ChatCommand::Help,
        "focus" => required(rest, FOCUS_USAGE, ChatCommand::Focus),
        "join" => required(rest, JOIN_USAGE, ChatCommand::Join),
        "leave" => ChatCommand::Leave(non_empty(split_word(rest).0)),
        _ => ChatCommand::Usage(CHANNEL_USAGE),
    }
}

/// Parse a chat input line into a message or command.
pub fn parse_input(input: &str) -> ChatInput {
    let trimmed = input.trim();

    let Some(without_slash) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed.to_string());
    };

    let (cmd, args) = split_word(without_slash);

    let command = match cmd.to_lowercase().as_str() {
        "channels" => ChatCommand::Channels,
        "channel" | "ch" => parse_channel_subcommand(args),
        "focus" => required(args, FOCUS_USAGE, ChatCommand::Focus),
        "join" => required(args, JOIN_USAGE, ChatCommand::Join),
        "leave" => ChatCommand::Leave(non_empty(split_word(args).0)),
        "msg" | "tell" | "w" => {
            let (target, message) = split_word(args);
            if target.is_empty() {
                ChatCommand::Usage(MSG_USAGE)
            } else {
                ChatCommand::Msg {
                    target: target.to_string(),
                    message: non_empty(message),
                }
            }
        }
        "r" | "reply" => ChatCommand::Reply(non_empty(args)),
        "list" | "who" => ChatCommand::Who,
        "pos" => parse_position(args),
        "help" | "h" | "?" => ChatCommand::Help,
        "quit" | "q" | "exit" => ChatCommand::Quit,
        _ => ChatCommand::Unknown(cmd.to_string()),
    };

    ChatInput::Command(command)
}

/// Chat command information for help display.
pub struct CommandInfo {
    /// Command syntax.
    pub syntax: &'static str,
    /// Command aliases.
    pub aliases: &'static [&'static str],
    /// Command description.
    pub description: &'static str,
}

/// Get all available command information.
pub fn get_command_help() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            syntax: "/channels",
            aliases: &["channel list"],
            description: "List channels, your focus and your joined channels",
        },
        CommandInfo {
            syntax: "/focus <channel>",
            aliases: &["channel focus"],
            description: "Focus a channel, joining it if needed",
        },
        CommandInfo {
            syntax: "/join <channel>",
            aliases: &["channel join"],
            description: "Join a channel",
        },
        CommandInfo {
            syntax: "/leave [channel]",
            aliases: &["channel leave"],
            description: "Leave a channel, or your focused channel",
        },
        CommandInfo {
            syntax: "/msg <user> [message]",
            aliases: &["tell", "w"],
            description: "Focus a user for direct messages and optionally send one",
        },
        CommandInfo {
            syntax: "/r [message]",
            aliases: &["reply"],
            description: "Reply to the last direct message you received",
        },
        CommandInfo {
            syntax: "/who",
            aliases: &["list"],
            description: "List online users",
        },
        CommandInfo {
            syntax: "/pos <x> <y> <z>",
            aliases: &[],
            description: "Set your position",
        },
        CommandInfo {
            syntax: "/quit",
            aliases: &["q", "exit"],
            description: "Disconnect",
        },
    ]
}

/// Format the help message for display.
pub fn format_help(settings: &ChatSettings) -> Vec<String> {
    let mut lines = vec!["&6Chat Commands:".to_string()];
    for info in get_command_help() {
        if info.aliases.is_empty() {
            lines.push(format!("  &e{}&7 - {}", info.syntax, info.description));
        } else {
            lines.push(format!(
                "  &e{}&7 (/{}) - {}",
                info.syntax,
                info.aliases.join(", /"),
                info.description
            ));
        }
    }
    let sep = &settings.prefix_separator;
    lines.push("&aChat Prefixes:".to_string());
    lines.push(format!(
        "  &e<shortcut>{sep} <message>&7 - send to a channel and focus it"
    ));
    lines.push(format!(
        "  &e{}{sep} <message>&7 - send to the default channel",
        settings.global_token
    ));
    lines.push(format!(
        "  &e{}{sep} <message>&7 - reply to your last direct message",
        settings.dm_reply_token
    ));
    lines
}

/// Format the channel list for `user`.
pub fn format_channel_list(core: &ChatCore, user: &UserId) -> Vec<String> {
    let registry = core.registry();
    if registry.is_empty() {
        return vec![format!("&c{}", ChatError::NoChannelsConfigured)];
    }

    let mut lines = vec!["&6Available Channels:".to_string()];
    for channel in registry.all() {
        let mut line = format!(
            "  {} &e{}&7 (Shortcut: {})",
            channel.display_prefix, channel.name, channel.shortcut
        );
        if channel.range >= 0 {
            line.push_str(&format!(" - Range: {}", channel.range));
        }
        match (channel.always_on, channel.permission.as_deref()) {
            (true, _) => line.push_str(" &8(Always On, Public)"),
            (false, None) => line.push_str(" &a(Public)"),
            (false, Some(node)) => line.push_str(&format!(" &7(Permission: {node})")),
        }
        lines.push(line);
    }

    if let Some(state) = core.user(user).map(|u| u.state()) {
        if let Some(focused) = state.focused_channel() {
            lines.push(format!("&9Your Focused Channel: &r{}", core.channel_label(focused)));
        }
        lines.push("&9Your Joined Channels:".to_string());
        for channel in registry.all().iter().filter(|c| state.is_joined(&c.name)) {
            lines.push(format!("  - {}", channel.label()));
        }
    }
    lines
}

/// Format the online user list.
pub fn format_who(core: &ChatCore) -> Vec<String> {
    if core.online_count() == 0 {
        return vec!["&eThere are no users currently online.".to_string()];
    }
    let mut lines = vec![format!("&6Online Users ({}):", core.online_count())];
    for user in core.users() {
        if user.name == user.id.as_str() {
            lines.push(format!("  - {}", user.name));
        } else {
            lines.push(format!("  - {} &7({})", user.name, user.id));
        }
    }
    lines
}

fn push_lines(out: &mut Outbox, user: &UserId, lines: Vec<String>) {
    for line in lines {
        out.notice(user, &line);
    }
}

/// Execute a parsed command for `user`.
pub fn execute(
    core: &mut ChatCore,
    user: &UserId,
    command: ChatCommand,
    out: &mut Outbox,
) -> CommandOutcome {
    debug!(user = %user, command = command.name(), "Executing chat command");

    let result: Result<(), ChatError> = match command {
        ChatCommand::Channels => {
            push_lines(out, user, format_channel_list(core, user));
            Ok(())
        }
        ChatCommand::Help => {
            push_lines(out, user, format_help(core.settings()));
            Ok(())
        }
        ChatCommand::Focus(name) => core.focus_channel(user, &name, out).map(|()| {
            out.notice(user, &format!("Focused channel: {}", core.channel_label(&name)));
        }),
        ChatCommand::Join(name) => core.join(user, &name, out).map(|outcome| {
            let label = core.channel_label(&name);
            match outcome {
                JoinOutcome::Joined => out.notice(user, &format!("Joined channel: {label}")),
                JoinOutcome::AlreadyJoined => {
                    out.notice(user, &format!("Already joined to channel: {label}"))
                }
            }
        }),
        ChatCommand::Leave(Some(name)) => {
            let label = core.channel_label(&name);
            core.leave(user, &name, out)
                .map(|()| out.notice(user, &format!("Left channel: {label}")))
        }
        ChatCommand::Leave(None) => match core.leave_focused(user, out) {
            Ok(Some(name)) => {
                out.notice(user, &format!("Left channel: {}", core.channel_label(&name)));
                Ok(())
            }
            Ok(None) => {
                out.notice(user, "You are not focused on any channel to leave.");
                Ok(())
            }
            Err(e) => Err(e),
        },
        ChatCommand::Msg { target, message } => match core.find_online_by_name(&target) {
            None => Err(ChatError::TargetOffline),
            Some(target_id) => core
                .message_user(user, &target_id, message.as_deref(), out)
                .map(|()| {
                    if message.is_none() {
                        core.announce_dm_focus(user, &target_id, out);
                    }
                }),
        },
        ChatCommand::Reply(Some(message)) => core.reply_to_last(user, &message, out).map(|_| ()),
        ChatCommand::Reply(None) => core.reply_target(user).and_then(|target| {
            core.focus_dm(user, &target, out)?;
            core.announce_dm_focus(user, &target, out);
            Ok(())
        }),
        ChatCommand::Who => {
            push_lines(out, user, format_who(core));
            Ok(())
        }
        ChatCommand::Move(position) => core
            .move_user(user, position)
            .map(|()| out.notice(user, &format!("Position set to {position}"))),
        ChatCommand::Quit => return CommandOutcome::Quit,
        ChatCommand::Usage(usage) => {
            out.error(user, &format!("Usage: {usage}"));
            Ok(())
        }
        ChatCommand::Unknown(cmd) => {
            out.error(
                user,
                &format!("Unknown command: /{cmd}. Type /help for a list of commands."),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        out.error(user, &e.to_string());
    }
    CommandOutcome::Continue
}

/// Handle one line of input: a command or a chat message.
pub fn handle_line(core: &mut ChatCore, user: &UserId, line: &str, out: &mut Outbox) -> CommandOutcome {
    match parse_input(line) {
        ChatInput::Command(command) => execute(core, user, command, out),
        ChatInput::Message(message) => {
            if let Err(e) = core.handle_chat(user, &message, out) {
                debug!(user = %user, "Chat message not delivered: {}", e);
            }
            CommandOutcome::Continue
        }
    }
}
