//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use parley::chat::markup::strip_codes;
use parley::{
    ChannelDefinition, ChannelRegistry, ChatCore, Outbox, PermissionGate, Position,
    StaticPermissions, UserId,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Permission node of the `staff` test channel.
pub const STAFF_NODE: &str = "chat.channel.staff";

/// `global` (always on), `local` (range 50, local formatter), `trade`
/// (range 30) and `staff` (permission gated).
pub fn test_channels() -> Vec<ChannelDefinition> {
    vec![
        ChannelDefinition::new("global", "g", "[G]").always_on(),
        ChannelDefinition::new("local", "l", "[L]")
            .with_range(50)
            .with_special_type("local"),
        ChannelDefinition::new("trade", "t", "[T]").with_range(30),
        ChannelDefinition::new("staff", "s", "[S]").with_permission(STAFF_NODE),
    ]
}

/// Chat core over [`test_channels`] with a seeded RNG.
pub fn test_core(seed: u64) -> (ChatCore, Arc<StaticPermissions>) {
    let permissions = Arc::new(StaticPermissions::new());
    let core = ChatCore::with_rng(
        ChannelRegistry::from_definitions(test_channels(), "global"),
        PermissionGate::new(permissions.clone()),
        StdRng::seed_from_u64(seed),
    );
    (core, permissions)
}

/// Connect `id` at `(x, 0, 0)` with no stored state.
pub fn connect_at(core: &mut ChatCore, id: &str, x: f64) -> UserId {
    let user = UserId::new(id);
    let mut out = Outbox::new();
    core.connect(
        user.clone(),
        id,
        Position::new(x, 0.0, 0.0),
        Default::default(),
        &mut out,
    )
    .unwrap();
    user
}

/// Lines delivered to `user`, markup removed.
pub fn plain_lines(out: &Outbox, user: &UserId) -> Vec<String> {
    out.lines_for(user).into_iter().map(strip_codes).collect()
}

/// Line-oriented TCP test client.
pub struct TestClient {
    reader: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let (read, writer) = TcpStream::connect(addr).await?.into_split();
        Ok(Self {
            reader: BufReader::new(read).lines(),
            writer,
        })
    }

    /// Send a line terminated with CRLF.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        self.writer.flush().await
    }

    /// Send raw bytes as-is.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Next line from the server, or `None` on EOF.
    pub async fn recv_line(&mut self) -> Option<String> {
        timeout(DEFAULT_TIMEOUT, self.reader.next_line())
            .await
            .ok()?
            .ok()?
    }

    /// Read lines until one contains `needle`. Returns all lines read.
    pub async fn recv_until(&mut self, needle: &str) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(line) = self.recv_line().await {
            let done = line.contains(needle);
            seen.push(line);
            if done {
                break;
            }
        }
        seen
    }
}
