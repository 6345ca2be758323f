//! TCP accept loop for the chat front end.
//!
//! Each admitted connection holds a [`SessionSlot`] for its lifetime. When
//! every slot is taken, new clients get [`SERVER_FULL_LINE`] and are closed
//! instead of waiting in the backlog.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::session::{ChatSession, SessionOptions};
use crate::chat::ChatHandle;
use crate::config::ServerConfig;
use crate::Result;

/// Line sent to a client refused for lack of a free slot.
pub const SERVER_FULL_LINE: &str = "Server is full, try again later.";

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(2);
const REFUSAL_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one accepted TCP connection.
pub enum Admission {
    /// A slot was free; the session may run.
    Admitted {
        stream: TcpStream,
        peer: SocketAddr,
        slot: SessionSlot,
    },
    /// Every slot was taken; the client has been told and dropped.
    Refused(SocketAddr),
}

/// Listener that admits up to `max_connections` chat sessions.
pub struct ChatServer {
    listener: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ChatServer {
    /// Bind to the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!(
            "Chat server listening on {} ({} slots)",
            listener.local_addr()?,
            config.max_connections
        );
        Ok(Self {
            listener,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Maximum number of concurrent sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions currently holding a slot.
    pub fn active_sessions(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Accept the next connection and admit or refuse it.
    pub async fn accept(&self) -> Result<Admission> {
        let (stream, peer) = self.listener.accept().await?;
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(peer = %peer, "Admitted connection");
                Ok(Admission::Admitted {
                    stream,
                    peer,
                    slot: SessionSlot { _permit: permit },
                })
            }
            Err(_) => {
                warn!(peer = %peer, capacity = self.capacity, "Server full, refusing connection");
                tokio::spawn(refuse(stream));
                Ok(Admission::Refused(peer))
            }
        }
    }

    /// Run a [`ChatSession`] for every admitted connection until the
    /// listener fails for good. Transient accept errors back off.
    pub async fn serve(self, handle: ChatHandle, options: SessionOptions) -> Result<()> {
        let mut backoff = ACCEPT_BACKOFF_MIN;
        loop {
            match self.accept().await {
                Ok(Admission::Admitted { stream, peer, slot }) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    let session = ChatSession::new(peer, handle.clone(), options.clone());
                    tokio::spawn(async move {
                        if let Err(e) = session.run(stream).await {
                            warn!(peer = %peer, "Session ended with error: {}", e);
                        }
                        drop(slot);
                    });
                }
                Ok(Admission::Refused(_)) => backoff = ACCEPT_BACKOFF_MIN,
                Err(e) => {
                    error!("Failed to accept connection, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

/// A session slot, released on drop.
pub struct SessionSlot {
    _permit: OwnedSemaphorePermit,
}

async fn refuse(mut stream: TcpStream) {
    let line = format!("{SERVER_FULL_LINE}\r\n");
    let write = async {
        stream.write_all(line.as_bytes()).await?;
        stream.shutdown().await
    };
    if let Err(e) = tokio::time::timeout(REFUSAL_WRITE_TIMEOUT, write)
        .await
        .unwrap_or_else(|_| Err(std::io::ErrorKind::TimedOut.into()))
    {
        debug!("Refusal write failed: {}", e);
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(ACCEPT_BACKOFF_MAX)
}
