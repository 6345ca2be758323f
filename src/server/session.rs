//! Line-oriented chat session over one TCP connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{ChatHandle, CommandOutcome, Delivery, Position, UserId};
use crate::error::ChatError;
use crate::screen::{create_screen, Screen};
use crate::{ParleyError, Result};

/// Maximum length of a user name.
pub const MAX_NAME_LENGTH: usize = 16;

/// Maximum accepted input line length in characters.
pub const MAX_LINE_LENGTH: usize = 512;

const NAME_ATTEMPTS: usize = 3;

/// Byte cap of one raw input line before decoding.
const MAX_LINE_BYTES: usize = MAX_LINE_LENGTH * 4;

/// Per-connection options.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Render markup as ANSI escapes.
    pub ansi: bool,
    /// Disconnect after this long without input.
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ansi: true,
            idle_timeout: Duration::from_secs(1800),
        }
    }
}

/// Check a user name. Returns the reason on failure.
pub fn validate_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("Name must not be empty.");
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err("Name is too long (16 characters max).");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Name may only contain letters, digits, '_' and '-'.");
    }
    Ok(())
}

/// A connected chat client.
pub struct ChatSession {
    /// Unique session identifier.
    id: Uuid,
    peer_addr: SocketAddr,
    handle: ChatHandle,
    options: SessionOptions,
}

impl ChatSession {
    /// Create a session for a freshly accepted connection.
    pub fn new(peer_addr: SocketAddr, handle: ChatHandle, options: SessionOptions) -> Self {
        let id = Uuid::new_v4();
        debug!("Created new session {} for {}", id, peer_addr);
        Self {
            id,
            peer_addr,
            handle,
            options,
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serve the connection until the client quits or disconnects.
    pub async fn run(self, stream: TcpStream) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half);

        let Some((user, deliveries)) = self.login(&mut lines, &mut write_half).await? else {
            return Ok(());
        };
        info!(session = %self.id, user = %user, peer = %self.peer_addr, "Session logged in");

        let writer = spawn_writer(write_half, deliveries, create_screen(self.options.ansi));

        let result = self.serve(&user, &mut lines).await;

        if let Err(e) = self.handle.disconnect(&user).await {
            warn!(session = %self.id, "Disconnect failed: {}", e);
        }
        if let Err(e) = writer.await {
            warn!(session = %self.id, "Writer task failed: {}", e);
        }
        info!(session = %self.id, user = %user, "Session closed");
        result
    }

    async fn login<R, W>(
        &self,
        lines: &mut R,
        writer: &mut W,
    ) -> Result<Option<(UserId, mpsc::UnboundedReceiver<Delivery>)>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer.write_all(b"Welcome to parley.\r\n").await?;
        for _ in 0..NAME_ATTEMPTS {
            writer.write_all(b"Enter your name: ").await?;
            writer.flush().await?;

            let Some(line) = self.next_line(lines).await? else {
                return Ok(None);
            };
            let name = line.trim();
            if let Err(reason) = validate_name(name) {
                writer.write_all(format!("{reason}\r\n").as_bytes()).await?;
                continue;
            }

            let user = UserId::new(name.to_lowercase());
            match self.handle.connect(user.clone(), name, Position::default()).await {
                Ok(deliveries) => return Ok(Some((user, deliveries))),
                Err(ParleyError::Chat(ChatError::AlreadyConnected(_))) => {
                    writer
                        .write_all(b"That name is already in use.\r\n")
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
        writer.write_all(b"Too many attempts.\r\n").await?;
        Ok(None)
    }

    async fn serve<R>(&self, user: &UserId, lines: &mut R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        while let Some(line) = self.next_line(lines).await? {
            if self.handle.send_line(user, line).await? == CommandOutcome::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Next input line, or `None` on EOF or idle timeout.
    async fn next_line<R>(&self, lines: &mut R) -> Result<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        match tokio::time::timeout(self.options.idle_timeout, read_line_bounded(lines)).await {
            Ok(line) => Ok(line?),
            Err(_) => {
                info!(session = %self.id, "Idle timeout");
                Ok(None)
            }
        }
    }
}

/// Read one line of at most [`MAX_LINE_LENGTH`] characters.
///
/// Bytes past the cap are discarded up to the next newline. Invalid UTF-8 is
/// replaced. `None` on EOF.
async fn read_line_bounded<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_LINE_BYTES {
        debug!("Input line over {} bytes, discarding the rest", MAX_LINE_BYTES);
        skip_to_newline(reader).await?;
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    let line: String = String::from_utf8_lossy(&buf)
        .chars()
        .take(MAX_LINE_LENGTH)
        .collect();
    Ok(Some(line))
}

async fn skip_to_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

/// Write rendered deliveries until the chat loop drops the sender.
fn spawn_writer<W>(
    mut writer: W,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
    screen: Box<dyn Screen>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(delivery) = deliveries.recv().await {
            let mut line = screen.render(&delivery.line);
            line.push_str("\r\n");
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                debug!("Client write failed: {}", e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    })
}
