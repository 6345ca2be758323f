//! Outbound relay sinks.
//!
//! Lines sent in the configured relay channel leave the chat loop through a
//! [`RelaySink`]. Inbound relay traffic enters through
//! [`ChatHandle::external_message`](super::ChatHandle::external_message).

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Destination for outbound relay lines.
pub trait RelaySink: Send + Sync {
    /// Forward one plain-text line. Must not block.
    fn send(&self, line: &str);
}

/// Relay sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelay;

impl RelaySink for LogRelay {
    fn send(&self, line: &str) {
        info!(target: "parley::relay", "{}", line);
    }
}

/// Relay sink that forwards lines over a channel to a bridge task.
#[derive(Debug, Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelRelay {
    /// Create a sink and the receiver the bridge reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RelaySink for ChannelRelay {
    fn send(&self, line: &str) {
        if self.tx.send(line.to_string()).is_err() {
            warn!("Relay bridge is gone, dropping line");
        }
    }
}
