//! Connection handling
//!
//! Each accepted connection gets a reader task and a writer task. The
//! reader reassembles frames from the byte stream and forwards them to the
//! engine task; the writer drains a channel of encoded frames onto the
//! socket. The engine itself never touches a socket, so a slow client can
//! only ever stall its own writer task.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::game::ConnId;
use crate::protocol::{FrameDecoder, Message};

/// Read buffer chunk size
const READ_CHUNK_SIZE: usize = 4096;

/// Events delivered to the engine task.
///
/// All events for one connection arrive in order: `Connected` first, then
/// its frames in stream order, then `Disconnected`.
#[derive(Debug)]
pub enum EngineEvent {
    Connected { conn: ConnId, handle: ConnectionHandle },
    Frame { conn: ConnId, message: Message },
    Disconnected { conn: ConnId },
}

#[derive(Debug)]
enum WriterCommand {
    Frame(Bytes),
    Shutdown,
}

/// A handle for sending frames to a connection's writer task.
///
/// Sends are unbounded so the engine task never blocks on a client.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<WriterCommand>,
}

impl ConnectionHandle {
    /// Queue an encoded frame for writing. Frames queued before a shutdown
    /// are flushed first.
    pub fn send_frame(&self, frame: Bytes) {
        let _ = self.sender.send(WriterCommand::Frame(frame));
    }

    /// Ask the writer task to close the socket after pending writes.
    pub fn shutdown(&self) {
        let _ = self.sender.send(WriterCommand::Shutdown);
    }
}

/// Register a freshly accepted connection and spawn its I/O tasks.
///
/// Generic over the stream so TCP and Unix socket connections share the
/// same handling.
pub fn spawn_connection<S>(stream: S, conn: ConnId, event_tx: mpsc::UnboundedSender<EngineEvent>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    // Registration goes through the same channel as the frames, so the
    // engine always sees Connected before the first frame.
    let _ = event_tx.send(EngineEvent::Connected {
        conn,
        handle: ConnectionHandle { sender: cmd_tx },
    });

    tokio::spawn(write_loop(writer, cmd_rx));
    tokio::spawn(read_loop(reader, conn, event_tx));
}

async fn read_loop<R>(mut reader: R, conn: ConnId, event_tx: mpsc::UnboundedSender<EngineEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);

    loop {
        while let Some(message) = decoder.decode(&mut buf) {
            if event_tx.send(EngineEvent::Frame { conn, message }).is_err() {
                // Engine task is gone; the server is shutting down.
                return;
            }
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!(%conn, "read error: {}", e);
                break;
            }
        }
    }

    let _ = event_tx.send(EngineEvent::Disconnected { conn });
}

async fn write_loop<W>(mut writer: W, mut cmd_rx: mpsc::UnboundedReceiver<WriterCommand>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            WriterCommand::Frame(frame) => {
                if writer.write_all(&frame).await.is_err() || writer.flush().await.is_err() {
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, MessageType};

    #[tokio::test]
    async fn test_reader_forwards_frames_in_order() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (client, server) = tokio::io::duplex(256);
        spawn_connection(server, ConnId(1), event_tx);

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(&encode(&Message::with_payload(
                MessageType::SubmitPassword,
                "pw",
            )))
            .await
            .unwrap();
        client_write
            .write_all(&encode(&Message::new(MessageType::RequestOpponents)))
            .await
            .unwrap();

        let handle = match event_rx.recv().await.unwrap() {
            EngineEvent::Connected { conn, handle } => {
                assert_eq!(conn, ConnId(1));
                handle
            }
            other => panic!("expected Connected, got {:?}", other),
        };
        match event_rx.recv().await.unwrap() {
            EngineEvent::Frame { message, .. } => {
                assert_eq!(message.message_type, MessageType::SubmitPassword)
            }
            other => panic!("expected Frame, got {:?}", other),
        }
        match event_rx.recv().await.unwrap() {
            EngineEvent::Frame { message, .. } => {
                assert_eq!(message.message_type, MessageType::RequestOpponents)
            }
            other => panic!("expected Frame, got {:?}", other),
        }

        // Writer path: a queued frame arrives, then shutdown closes the stream.
        handle.send_frame(encode(&Message::new(MessageType::AuthRequired)));
        handle.shutdown();

        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, encode(&Message::new(MessageType::AuthRequired)).to_vec());
    }

    #[tokio::test]
    async fn test_peer_close_reports_disconnect() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (client, server) = tokio::io::duplex(256);
        spawn_connection(server, ConnId(2), event_tx);

        drop(client);

        assert!(matches!(
            event_rx.recv().await.unwrap(),
            EngineEvent::Connected { .. }
        ));
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            EngineEvent::Disconnected { conn: ConnId(2) }
        ));
    }
}
