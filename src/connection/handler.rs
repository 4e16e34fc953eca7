//! Connection Session
//!
//! One task per accepted socket. The session accumulates bytes in a buffer,
//! peels complete requests off it (inline or array form, decided by the first
//! byte), dispatches them, and writes replies back.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │            Session loop              │
//! │                                      │
//! │  read bytes (300 s idle deadline)    │
//! │        │                             │
//! │        ▼                             │
//! │  parse request(s) from buffer        │
//! │        │                             │
//! │        ▼                             │
//! │  dispatch ──▶ write reply            │
//! │        │                             │
//! │        └── SUBSCRIBE? enter          │
//! │            subscriber mode ──────────┼──▶ forward queue messages
//! └──────────────────────────────────────┘
//! ```
//!
//! A SUBSCRIBE turns the session into a pure message pump: it acknowledges
//! the subscription, then blocks on its queue and writes one frame per
//! message until the socket dies. On every exit path out of subscriber mode
//! the session removes its queue from the hub.
//!
//! Malformed array frames get a `-ERR Protocol error` reply and the session
//! ends; a session failure never travels past its own task.

use crate::commands::CommandHandler;
use crate::protocol::{message_frame, parse_request, subscribe_ack, ParseError, Reply};
use crate::storage::{Store, Subscription};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// A connection with no complete request for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Hard ceiling on buffered request bytes (64 KB).
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Network failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed array frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The client closed the connection.
    #[error("client disconnected")]
    Disconnected,

    /// No complete request within the idle deadline.
    #[error("idle timeout")]
    IdleTimeout,

    /// The client sent a single request larger than the buffer ceiling.
    #[error("request buffer limit exceeded")]
    BufferFull,
}

/// Serves one client connection to completion.
///
/// Spawn this as its own task; it never returns an error to the caller, and a
/// panic inside stays confined to the task.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, store: Arc<Store>) {
    let session = Session::new(stream, addr, store);
    if let Err(err) = session.run().await {
        match err {
            ConnectionError::Disconnected | ConnectionError::IdleTimeout => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %err, "connection ended with error"),
        }
    }
}

struct Session {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    store: Arc<Store>,
    handler: CommandHandler,
}

impl Session {
    fn new(stream: TcpStream, addr: SocketAddr, store: Arc<Store>) -> Self {
        let handler = CommandHandler::new(Arc::clone(&store));
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            store,
            handler,
        }
    }

    async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");
        let result = self.serve().await;
        match &result {
            Ok(()) | Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::IdleTimeout) => {
                debug!(client = %self.addr, "client idle, dropping connection")
            }
            Err(err) => warn!(client = %self.addr, error = %err, "session error"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete request already buffered (pipelining).
            loop {
                let parsed = match parse_request(&self.buffer) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(client = %self.addr, error = %err, "protocol error");
                        let reply = Reply::Error(format!("Protocol error: {err}"));
                        self.write_bytes(&reply.encode()).await?;
                        return Err(ConnectionError::Protocol(err));
                    }
                };
                let parts = match parsed {
                    Some((parts, consumed)) => {
                        let _ = self.buffer.split_to(consumed);
                        parts
                    }
                    None => break,
                };
                if parts.is_empty() {
                    continue;
                }

                if parts[0].eq_ignore_ascii_case(b"SUBSCRIBE") {
                    if parts.len() < 2 {
                        self.write_bytes(&Reply::wrong_arity("subscribe").encode())
                            .await?;
                        continue;
                    }
                    // Subscriber mode holds the connection until it dies.
                    return self.serve_subscriber(&parts[1]).await;
                }

                let reply = self.handler.execute(&parts);
                trace!(client = %self.addr, reply = ?reply, "dispatched command");
                self.write_bytes(&reply.encode()).await?;
            }

            self.fill_buffer().await?;
        }
    }

    /// Reads more bytes from the socket, bounded by the idle deadline.
    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                buffered = self.buffer.len(),
                "request buffer limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        let read = tokio::time::timeout(
            IDLE_TIMEOUT,
            self.stream.get_mut().read_buf(&mut self.buffer),
        )
        .await;
        let n = match read {
            Ok(result) => result?,
            Err(_elapsed) => return Err(ConnectionError::IdleTimeout),
        };
        if n == 0 {
            return Err(ConnectionError::Disconnected);
        }
        trace!(client = %self.addr, bytes = n, "read data");
        Ok(())
    }

    async fn serve_subscriber(&mut self, channel: &[u8]) -> Result<(), ConnectionError> {
        let channel = String::from_utf8_lossy(channel).into_owned();
        let mut subscription = self.store.hub.subscribe(&channel);
        debug!(client = %self.addr, channel = %channel, "client subscribed");

        let result = self.pump_messages(&channel, &mut subscription).await;

        // Deregister on every exit path so the hub drops the queue instead of
        // finding it closed on the next publish.
        self.store.hub.unsubscribe(&channel, subscription.id());
        debug!(client = %self.addr, channel = %channel, "client unsubscribed");
        result
    }

    async fn pump_messages(
        &mut self,
        channel: &str,
        subscription: &mut Subscription,
    ) -> Result<(), ConnectionError> {
        self.write_bytes(&subscribe_ack(channel)).await?;

        while let Some(message) = subscription.recv().await {
            self.write_bytes(&message_frame(channel, &message)).await?;
        }
        Ok(())
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn spawn_server() -> (SocketAddr, Arc<Store>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());

        let accept_store = Arc::clone(&store);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let store = Arc::clone(&accept_store);
                tokio::spawn(handle_connection(stream, client_addr, store));
            }
        });

        (addr, store)
    }

    async fn read_reply(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 512];
        let n = client.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn ping_pong_inline() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn set_get_inline() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"SET greeting hello\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client.write_all(b"GET greeting\r\n").await.unwrap();
        // Value hits are written bare, without a $len prefix.
        assert_eq!(read_reply(&mut client).await, b"hello\r\n");

        client.write_all(b"GET missing\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn quoted_inline_values() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"SET msg \"hello world\"\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client.write_all(b"GET msg\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"hello world\r\n");
    }

    #[tokio::test]
    async fn array_form() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$3\r\nAnn\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"Ann\r\n");
    }

    #[tokio::test]
    async fn hash_commands_over_the_wire() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"HSET u name Ann\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client.write_all(b"HGET u name\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"Ann\r\n");

        client.write_all(b"HGETALL u\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"name\nAnn\n");

        client.write_all(b"HGETALL missing\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"*0\r\n");

        client.write_all(b"HDEL u name\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b":1\r\n");
        client.write_all(b"HDEL u name\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b":0\r\n");
    }

    #[tokio::test]
    async fn unknown_command_and_wrong_type() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"NOSUCH thing\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"-ERR unknown command\r\n");

        client.write_all(b"HSET h f v\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");
        client.write_all(b"GET h\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut client).await,
            b"-WARN WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
    }

    #[tokio::test]
    async fn protocol_error_closes_session() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // Array element without a bulk header.
        client
            .write_all(b"*2\r\n$3\r\nGET\r\nbogus\r\n")
            .await
            .unwrap();

        let reply = read_reply(&mut client).await;
        assert!(reply.starts_with(b"-ERR Protocol error:"), "got {reply:?}");

        // The server closed its end.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn pipelined_inline_commands() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"SET k1 v1\r\nSET k2 v2\r\nGET k1\r\nGET k2\r\n")
            .await
            .unwrap();

        // +OK\r\n +OK\r\n v1\r\n v2\r\n == 18 bytes
        let mut collected = Vec::new();
        while collected.len() < 18 {
            let chunk = read_reply(&mut client).await;
            if chunk.is_empty() {
                break;
            }
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"+OK\r\n+OK\r\nv1\r\nv2\r\n");
    }

    #[tokio::test]
    async fn subscribe_receives_published_messages() {
        let (addr, store) = spawn_server().await;

        let mut subscriber = TcpStream::connect(addr).await.unwrap();
        subscriber.write_all(b"SUBSCRIBE news\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut subscriber).await,
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n"
        );
        // The ack is written after hub registration, so publishing is safe now.
        assert_eq!(store.hub.subscriber_count("news"), 1);

        let mut publisher = TcpStream::connect(addr).await.unwrap();
        publisher.write_all(b"PUBLISH news hello\r\n").await.unwrap();
        assert_eq!(read_reply(&mut publisher).await, b":1\r\n");

        assert_eq!(
            read_reply(&mut subscriber).await,
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n"
        );
    }

    #[tokio::test]
    async fn subscribe_arity_error_keeps_session() {
        let (addr, _) = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"SUBSCRIBE\r\n").await.unwrap();
        assert_eq!(
            read_reply(&mut client).await,
            &b"-ERR wrong number of arguments for 'subscribe' command\r\n"[..]
        );

        // Still a normal command session.
        client.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn subscriber_disconnect_deregisters() {
        let (addr, store) = spawn_server().await;

        let mut subscriber = TcpStream::connect(addr).await.unwrap();
        subscriber.write_all(b"SUBSCRIBE gone\r\n").await.unwrap();
        let _ = read_reply(&mut subscriber).await;
        assert_eq!(store.hub.subscriber_count("gone"), 1);

        drop(subscriber);

        // The pump notices the dead socket on the next delivery attempt.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while store.hub.subscriber_count("gone") > 0 {
            store.hub.publish("gone", bytes::Bytes::from("poke"));
            if tokio::time::Instant::now() > deadline {
                panic!("subscriber never deregistered");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
