//! Serialized chat loop.
//!
//! A single task owns the [`ChatCore`]. Sessions, the relay bridge and the
//! reload trigger talk to it through a cloneable [`ChatHandle`], so every
//! chat operation runs to completion before the next one starts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::{self, CommandOutcome};
use super::outbox::{Delivery, Outbox};
use super::permission::GrantTable;
use super::presence::{Position, UserId};
use super::relay::RelaySink;
use super::service::ChatCore;
use super::state::StoredChatState;
use crate::channel::ChannelDefinition;
use crate::error::ChatError;
use crate::store::ChatStateStore;
use crate::{ParleyError, Result};

/// Default capacity of the request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Requests processed by the chat loop.
pub enum ChatRequest {
    Connect {
        id: UserId,
        name: String,
        position: Position,
        sink: mpsc::UnboundedSender<Delivery>,
        reply: oneshot::Sender<std::result::Result<(), ChatError>>,
    },
    Line {
        id: UserId,
        line: String,
        reply: oneshot::Sender<CommandOutcome>,
    },
    Move {
        id: UserId,
        position: Position,
        reply: oneshot::Sender<std::result::Result<(), ChatError>>,
    },
    Disconnect {
        id: UserId,
        reply: oneshot::Sender<()>,
    },
    External {
        author: String,
        content: String,
    },
    Reload {
        definitions: Vec<ChannelDefinition>,
        default_channel: String,
        grants: Option<GrantTable>,
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        id: UserId,
        reply: oneshot::Sender<Option<StoredChatState>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the chat loop.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    tx: mpsc::Sender<ChatRequest>,
}

impl ChatHandle {
    /// Spawn the chat loop on the current runtime.
    pub fn spawn<S: ChatStateStore>(
        core: ChatCore,
        store: Arc<S>,
        relay: Arc<dyn RelaySink>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_chat_loop(core, store, relay, rx));
        (Self { tx }, task)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ChatRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ParleyError::ChatClosed)?;
        rx.await.map_err(|_| ParleyError::ChatClosed)
    }

    /// Bring a user online. Returns the receiver for their deliveries.
    ///
    /// Only a duplicate login is refused; a user connected without any
    /// usable channel stays online without a focus.
    pub async fn connect(
        &self,
        id: UserId,
        name: impl Into<String>,
        position: Position,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>> {
        let (sink, deliveries) = mpsc::unbounded_channel();
        let name = name.into();
        let user = id.clone();
        let result = self
            .request(|reply| ChatRequest::Connect {
                id,
                name,
                position,
                sink,
                reply,
            })
            .await?;
        match result {
            Ok(()) => {}
            Err(e @ ChatError::AlreadyConnected(_)) => return Err(e.into()),
            Err(e) => warn!(user = %user, "Connected without a focused channel: {}", e),
        }
        Ok(deliveries)
    }

    /// Handle one input line from a user.
    pub async fn send_line(&self, id: &UserId, line: impl Into<String>) -> Result<CommandOutcome> {
        let id = id.clone();
        let line = line.into();
        self.request(|reply| ChatRequest::Line { id, line, reply })
            .await
    }

    /// Update a user's position.
    pub async fn move_to(&self, id: &UserId, position: Position) -> Result<()> {
        let id = id.clone();
        self.request(|reply| ChatRequest::Move {
            id,
            position,
            reply,
        })
        .await?
        .map_err(ParleyError::from)
    }

    /// Take a user offline, saving their state.
    pub async fn disconnect(&self, id: &UserId) -> Result<()> {
        let id = id.clone();
        self.request(|reply| ChatRequest::Disconnect { id, reply })
            .await
    }

    /// Deliver an inbound relay message to every connected user.
    pub async fn external_message(
        &self,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        self.tx
            .send(ChatRequest::External {
                author: author.into(),
                content: content.into(),
            })
            .await
            .map_err(|_| ParleyError::ChatClosed)
    }

    /// Like [`external_message`](Self::external_message), for bridges running
    /// on their own OS thread. Must not be called from async code.
    pub fn external_message_blocking(
        &self,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        self.tx
            .blocking_send(ChatRequest::External {
                author: author.into(),
                content: content.into(),
            })
            .map_err(|_| ParleyError::ChatClosed)
    }

    /// Replace the channel registry and reconcile every online user.
    pub async fn reload(
        &self,
        definitions: Vec<ChannelDefinition>,
        default_channel: impl Into<String>,
    ) -> Result<usize> {
        self.send_reload(definitions, default_channel.into(), None)
            .await
    }

    /// Replace grants and the channel registry in one step on the loop.
    pub async fn reload_with_grants(
        &self,
        definitions: Vec<ChannelDefinition>,
        default_channel: impl Into<String>,
        grants: GrantTable,
    ) -> Result<usize> {
        self.send_reload(definitions, default_channel.into(), Some(grants))
            .await
    }

    async fn send_reload(
        &self,
        definitions: Vec<ChannelDefinition>,
        default_channel: String,
        grants: Option<GrantTable>,
    ) -> Result<usize> {
        self.request(|reply| ChatRequest::Reload {
            definitions,
            default_channel,
            grants,
            reply,
        })
        .await
    }

    /// Current persistable state of an online user.
    pub async fn snapshot(&self, id: &UserId) -> Result<Option<StoredChatState>> {
        let id = id.clone();
        self.request(|reply| ChatRequest::Snapshot { id, reply })
            .await
    }

    /// Save every online user and stop the loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| ChatRequest::Shutdown { reply }).await
    }
}

/// Deliveries, saves and relay lines produced by one request.
async fn flush<S: ChatStateStore>(
    out: Outbox,
    core: &ChatCore,
    sinks: &HashMap<UserId, mpsc::UnboundedSender<Delivery>>,
    store: &S,
    relay: &dyn RelaySink,
) {
    let (deliveries, dirty, relayed) = out.into_parts();

    for delivery in deliveries {
        match sinks.get(&delivery.recipient) {
            Some(sink) => {
                if sink.send(delivery).is_err() {
                    debug!("Session receiver dropped, delivery discarded");
                }
            }
            None => debug!(user = %delivery.recipient, "No session for delivery"),
        }
    }

    for id in dirty {
        if let Some(state) = core.snapshot(&id) {
            if let Err(e) = store.save(&id, &state).await {
                warn!(user = %id, "Failed to save chat state: {}", e);
            }
        }
    }

    for line in relayed {
        relay.send(&line);
    }
}

/// Run the chat loop until shutdown or until every handle is dropped.
pub async fn run_chat_loop<S: ChatStateStore>(
    mut core: ChatCore,
    store: Arc<S>,
    relay: Arc<dyn RelaySink>,
    mut rx: mpsc::Receiver<ChatRequest>,
) {
    let mut sinks: HashMap<UserId, mpsc::UnboundedSender<Delivery>> = HashMap::new();
    info!("Chat loop started");

    while let Some(request) = rx.recv().await {
        let mut out = Outbox::new();

        match request {
            ChatRequest::Connect {
                id,
                name,
                position,
                sink,
                reply,
            } => {
                if core.is_online(&id) {
                    let _ = reply.send(Err(ChatError::AlreadyConnected(id)));
                    continue;
                }
                let stored = match store.load(&id).await {
                    Ok(stored) => stored.unwrap_or_default(),
                    Err(e) => {
                        warn!(user = %id, "Failed to load chat state, starting fresh: {}", e);
                        StoredChatState::default()
                    }
                };
                sinks.insert(id.clone(), sink);
                let result = core.connect(id.clone(), &name, position, stored, &mut out);
                info!(user = %id, name = %name, online = core.online_count(), "User connected");
                flush(out, &core, &sinks, store.as_ref(), relay.as_ref()).await;
                let _ = reply.send(result);
            }
            ChatRequest::Line { id, line, reply } => {
                let outcome = command::handle_line(&mut core, &id, &line, &mut out);
                flush(out, &core, &sinks, store.as_ref(), relay.as_ref()).await;
                let _ = reply.send(outcome);
            }
            ChatRequest::Move {
                id,
                position,
                reply,
            } => {
                let _ = reply.send(core.move_user(&id, position));
            }
            ChatRequest::Disconnect { id, reply } => {
                let saved = core.disconnect(&id, &mut out);
                flush(out, &core, &sinks, store.as_ref(), relay.as_ref()).await;
                sinks.remove(&id);
                if let Some(state) = saved {
                    if let Err(e) = store.save(&id, &state).await {
                        warn!(user = %id, "Failed to save chat state: {}", e);
                    }
                    info!(user = %id, online = core.online_count(), "User disconnected");
                }
                let _ = reply.send(());
            }
            ChatRequest::External { author, content } => {
                core.external_message(&author, &content, &mut out);
                flush(out, &core, &sinks, store.as_ref(), relay.as_ref()).await;
            }
            ChatRequest::Reload {
                definitions,
                default_channel,
                grants,
                reply,
            } => {
                let loaded =
                    core.reload_with_grants(definitions, &default_channel, grants, &mut out);
                flush(out, &core, &sinks, store.as_ref(), relay.as_ref()).await;
                let _ = reply.send(loaded);
            }
            ChatRequest::Snapshot { id, reply } => {
                let _ = reply.send(core.snapshot(&id));
            }
            ChatRequest::Shutdown { reply } => {
                let online: Vec<UserId> = core.users().map(|u| u.id.clone()).collect();
                for id in online {
                    if let Some(state) = core.snapshot(&id) {
                        if let Err(e) = store.save(&id, &state).await {
                            warn!(user = %id, "Failed to save chat state: {}", e);
                        }
                    }
                }
                let _ = reply.send(());
                break;
            }
        }
    }

    info!("Chat loop stopped");
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::chat::markup::strip_codes;
    use crate::chat::permission::PermissionGate;
    use crate::chat::relay::ChannelRelay;
    use crate::chat::ChatSettings;
    use crate::store::MemoryStateStore;

    fn core() -> ChatCore {
        let registry = ChannelRegistry::from_definitions(
            vec![
                ChannelDefinition::new("global", "g", "[G]").always_on(),
                ChannelDefinition::new("trade", "t", "[T]"),
            ],
            "global",
        );
        ChatCore::with_rng(registry, PermissionGate::allow_all(), StdRng::seed_from_u64(1))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(d) = rx.try_recv() {
            lines.push(strip_codes(&d.line));
        }
        lines
    }

    #[tokio::test]
    async fn test_connect_and_chat() {
        let store = Arc::new(MemoryStateStore::new());
        let (relay, _relay_rx) = ChannelRelay::new();
        let (handle, _task) = ChatHandle::spawn(core(), store.clone(), Arc::new(relay), 8);

        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let mut alice_rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();
        let mut bob_rx = handle.connect(bob.clone(), "Bob", Position::default()).await.unwrap();
        assert!(drain(&mut alice_rx)[0].starts_with("Focused channel"));
        drain(&mut bob_rx);

        let outcome = handle.send_line(&alice, "hello").await.unwrap();
        assert_eq!(outcome, CommandOutcome::Continue);
        assert_eq!(drain(&mut bob_rx), vec!["[G] Alice: hello"]);
        assert_eq!(store.get(&alice), Some(StoredChatState::new(["global"], Some("global"))));
    }

    #[tokio::test]
    async fn test_duplicate_connect_refused() {
        let store = Arc::new(MemoryStateStore::new());
        let (handle, _task) = ChatHandle::spawn(core(), store, Arc::new(crate::chat::LogRelay), 8);
        let alice = UserId::new("alice");
        let _rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();
        let err = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap_err();
        assert!(matches!(err, ParleyError::Chat(ChatError::AlreadyConnected(_))));
    }

    #[tokio::test]
    async fn test_state_restored_on_reconnect() {
        let store = Arc::new(MemoryStateStore::new());
        let (handle, _task) =
            ChatHandle::spawn(core(), store.clone(), Arc::new(crate::chat::LogRelay), 8);
        let alice = UserId::new("alice");

        let _rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();
        handle.send_line(&alice, "/focus trade").await.unwrap();
        handle.disconnect(&alice).await.unwrap();
        assert_eq!(
            store.get(&alice),
            Some(StoredChatState::new(["global", "trade"], Some("trade")))
        );

        let _rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();
        let snapshot = handle.snapshot(&alice).await.unwrap().unwrap();
        assert_eq!(snapshot.focus.as_deref(), Some("trade"));
    }

    #[tokio::test]
    async fn test_relay_roundtrip() {
        let store = Arc::new(MemoryStateStore::new());
        let (relay, mut relay_rx) = ChannelRelay::new();
        let core = core().with_settings(ChatSettings {
            relay_channel: Some("global".to_string()),
            ..Default::default()
        });
        let (handle, _task) = ChatHandle::spawn(core, store, Arc::new(relay), 8);
        let alice = UserId::new("alice");
        let mut rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();
        drain(&mut rx);

        handle.send_line(&alice, "&aping").await.unwrap();
        assert_eq!(relay_rx.recv().await.unwrap(), "Alice: ping");

        handle.external_message("carol", "pong").await.unwrap();
        handle.snapshot(&alice).await.unwrap();
        let lines = drain(&mut rx);
        assert_eq!(lines.last().map(String::as_str), Some("[Relay] carol: pong"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let store = Arc::new(MemoryStateStore::new());
        let (handle, task) =
            ChatHandle::spawn(core(), store.clone(), Arc::new(crate::chat::LogRelay), 8);
        let alice = UserId::new("alice");
        let _rx = handle.connect(alice.clone(), "Alice", Position::default()).await.unwrap();

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(store.get(&alice).is_some());
        assert!(matches!(
            handle.send_line(&alice, "hi").await,
            Err(ParleyError::ChatClosed)
        ));
    }
}
