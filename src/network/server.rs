//! GuessNet server
//!
//! Accepts player connections and runs the game engine. All registry and
//! engine mutation happens on one task: connection tasks feed it events
//! over a channel, it processes one frame to completion, and the resulting
//! send/close actions go back out through the per-connection handles.

use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};

use super::connection::{spawn_connection, ConnectionHandle, EngineEvent};
use super::NetworkConfig;
use crate::game::{Action, ConnId, Engine};
use crate::observer::Notification;
use crate::protocol::encode;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// GuessNet game server
pub struct Server {
    listener: TcpListener,
    #[cfg(unix)]
    unix_listener: Option<UnixListener>,
    password: String,
    notify_tx: broadcast::Sender<Notification>,
}

impl Server {
    /// Bind the game listeners.
    pub async fn bind(
        config: &NetworkConfig,
        password: String,
        notify_tx: broadcast::Sender<Notification>,
    ) -> ServerResult<Self> {
        let bind_addr = format!(
            "{}:{}",
            config.bind_address.as_deref().unwrap_or("0.0.0.0"),
            config.port
        );
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        #[cfg(unix)]
        let unix_listener = match &config.socket_path {
            Some(path) => {
                // A socket file left by a previous run would block the bind.
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path).map_err(|e| {
                    ServerError::BindFailed(format!(
                        "Failed to bind to {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                tracing::info!("Server also listening on {}", path.display());
                Some(listener)
            }
            None => None,
        };

        Ok(Self {
            listener,
            #[cfg(unix)]
            unix_listener,
            password,
            notify_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the process shuts down.
    pub async fn run(self) -> ServerResult<()> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let engine = Engine::new(self.password, self.notify_tx);
        tokio::spawn(run_engine(engine, event_rx));

        // Connection slots are assigned in acceptance order; the registry's
        // opponent ordering depends on that.
        let mut next_conn = 0u64;

        loop {
            #[cfg(unix)]
            if let Some(unix_listener) = &self.unix_listener {
                tokio::select! {
                    result = self.listener.accept() => match result {
                        Ok((stream, addr)) => {
                            next_conn += 1;
                            tracing::info!("New connection from {}", addr);
                            spawn_connection(stream, ConnId(next_conn), event_tx.clone());
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    },
                    result = unix_listener.accept() => match result {
                        Ok((stream, _)) => {
                            next_conn += 1;
                            tracing::info!("New local socket connection");
                            spawn_connection(stream, ConnId(next_conn), event_tx.clone());
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    },
                }
                continue;
            }

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    next_conn += 1;
                    tracing::info!("New connection from {}", addr);
                    spawn_connection(stream, ConnId(next_conn), event_tx.clone());
                }
                Err(e) => tracing::error!("Accept error: {}", e),
            }
        }
    }
}

/// The single task owning the engine and all connection handles.
async fn run_engine(mut engine: Engine, mut event_rx: mpsc::UnboundedReceiver<EngineEvent>) {
    let mut handles: HashMap<ConnId, ConnectionHandle> = HashMap::new();

    while let Some(event) = event_rx.recv().await {
        match event {
            EngineEvent::Connected { conn, handle } => {
                handles.insert(conn, handle);
                let actions = engine.on_connect(conn);
                execute(&mut handles, actions);
            }
            EngineEvent::Frame { conn, message } => {
                let actions = engine.on_frame(conn, message);
                execute(&mut handles, actions);
            }
            EngineEvent::Disconnected { conn } => {
                engine.on_disconnect(conn);
                handles.remove(&conn);
            }
        }
    }
}

/// Perform the engine's actions, in order.
fn execute(handles: &mut HashMap<ConnId, ConnectionHandle>, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Send { conn, message } => {
                if let Some(handle) = handles.get(&conn) {
                    handle.send_frame(encode(&message));
                }
            }
            Action::Close { conn } => {
                // The handle may already be gone; closing twice is a no-op.
                if let Some(handle) = handles.remove(&conn) {
                    handle.shutdown();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameDecoder, Message, MessageType};
    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct TestClient {
        stream: TcpStream,
        decoder: FrameDecoder,
        buf: BytesMut,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                decoder: FrameDecoder::new(),
                buf: BytesMut::new(),
            }
        }

        async fn send(&mut self, message: Message) {
            self.stream.write_all(&encode(&message)).await.unwrap();
        }

        async fn recv(&mut self) -> Message {
            loop {
                if let Some(message) = self.decoder.decode(&mut self.buf) {
                    return message;
                }
                let mut chunk = [0u8; 1024];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed while expecting a frame");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }

        async fn expect_closed(&mut self) {
            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert_eq!(n, 0, "expected the server to close the connection");
        }
    }

    async fn start_server(password: &str) -> SocketAddr {
        let config = NetworkConfig {
            port: 0,
            bind_address: Some("127.0.0.1".to_string()),
            socket_path: None,
        };
        let (notify_tx, _) = broadcast::channel(64);
        let server = Server::bind(&config, password.to_string(), notify_tx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn login(client: &mut TestClient, password: &str) -> String {
        let auth = client.recv().await;
        assert_eq!(auth.message_type, MessageType::AuthRequired);
        client
            .send(Message::with_payload(MessageType::SubmitPassword, password))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply.message_type, MessageType::PasswordCorrect);
        reply.payload.unwrap()
    }

    #[tokio::test]
    async fn test_wrong_password_closes_the_connection() {
        let addr = start_server("letmein").await;
        let mut client = TestClient::connect(addr).await;

        let auth = client.recv().await;
        assert_eq!(auth.message_type, MessageType::AuthRequired);
        client
            .send(Message::with_payload(MessageType::SubmitPassword, "nope"))
            .await;

        let reply = client.recv().await;
        assert_eq!(reply.message_type, MessageType::PasswordIncorrect);
        client.expect_closed().await;
    }

    #[tokio::test]
    async fn test_full_game_over_loopback() {
        let addr = start_server("letmein").await;

        let mut alice = TestClient::connect(addr).await;
        let alice_id = login(&mut alice, "letmein").await;
        let mut bob = TestClient::connect(addr).await;
        let bob_id = login(&mut bob, "letmein").await;

        // Alice discovers Bob and challenges without naming him.
        alice.send(Message::new(MessageType::RequestOpponents)).await;
        let opponents = alice.recv().await;
        assert_eq!(opponents.message_type, MessageType::Opponents);
        assert_eq!(opponents.payload.as_deref(), Some(bob_id.as_str()));

        alice
            .send(Message::with_payload(MessageType::Challenge, "apple"))
            .await;
        let accepted = alice.recv().await;
        assert_eq!(accepted.message_type, MessageType::ChallengeAccepted);
        assert_eq!(accepted.payload.as_deref(), Some(bob_id.as_str()));

        let start = bob.recv().await;
        assert_eq!(start.message_type, MessageType::GuessStart);
        assert_eq!(start.payload.as_deref(), Some(alice_id.as_str()));

        // A wrong guess keeps both connections open.
        bob.send(Message::with_payload(MessageType::Move, "pear")).await;
        assert_eq!(bob.recv().await.message_type, MessageType::WrongAttempt);
        assert_eq!(alice.recv().await.message_type, MessageType::Attempt);

        // A hint travels master to guesser.
        alice
            .send(Message::with_payload(MessageType::Hint, "a fruit"))
            .await;
        let hint = bob.recv().await;
        assert_eq!(hint.message_type, MessageType::HintRelay);
        assert_eq!(hint.payload.as_deref(), Some("a fruit"));

        // The right guess ends the game and closes both sockets.
        bob.send(Message::with_payload(MessageType::Move, "apple")).await;
        assert_eq!(bob.recv().await.message_type, MessageType::Win);
        assert_eq!(alice.recv().await.message_type, MessageType::CorrectAttempt);
        bob.expect_closed().await;
        alice.expect_closed().await;
    }

    #[tokio::test]
    async fn test_give_up_notifies_the_opponent() {
        let addr = start_server("letmein").await;

        let mut alice = TestClient::connect(addr).await;
        login(&mut alice, "letmein").await;
        let mut bob = TestClient::connect(addr).await;
        let bob_id = login(&mut bob, "letmein").await;

        alice
            .send(Message::with_payload(
                MessageType::Challenge,
                format!("apple|{}", bob_id),
            ))
            .await;
        assert_eq!(
            alice.recv().await.message_type,
            MessageType::ChallengeAccepted
        );
        assert_eq!(bob.recv().await.message_type, MessageType::GuessStart);

        bob.send(Message::new(MessageType::GiveUp)).await;
        assert_eq!(alice.recv().await.message_type, MessageType::GameOver);
        alice.expect_closed().await;
        bob.expect_closed().await;
    }
}
