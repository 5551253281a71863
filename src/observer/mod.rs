//! Observer module - Read-only telemetry feed
//!
//! Every frame the engine processes, in either direction, produces one
//! [`Notification`]. The observer server fans them out as JSON over a
//! WebSocket so a dashboard can watch games live. Delivery is best effort:
//! with no observers connected the notifications are dropped, and the game
//! server never waits for an observer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};

/// Observer server errors
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One processed frame, as reported to observers.
///
/// `input` is true for client-to-server traffic. The sequence `id` is not
/// part of this record; the sink assigns it at delivery time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub client_id: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub input: bool,
}

/// The JSON record actually sent to an observer.
#[derive(Debug, Serialize)]
struct ObserverRecord<'a> {
    id: u64,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// WebSocket server broadcasting engine notifications.
pub struct ObserverServer {
    listener: TcpListener,
    notify_tx: broadcast::Sender<Notification>,
}

impl ObserverServer {
    /// Bind the observer listener.
    pub async fn bind(
        addr: SocketAddr,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<Self, ObserverError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Observer feed listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            notify_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept observers until the process shuts down.
    pub async fn run(self) -> Result<(), ObserverError> {
        // One counter shared by all observer connections, so ids stay
        // monotonic across the whole feed.
        let next_id = Arc::new(AtomicU64::new(0));

        loop {
            let (stream, addr) = self.listener.accept().await?;
            tracing::debug!("Observer connected from {}", addr);

            let notify_rx = self.notify_tx.subscribe();
            let next_id = next_id.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_observer(stream, notify_rx, next_id).await {
                    tracing::debug!("Observer {} dropped: {}", addr, e);
                }
            });
        }
    }
}

/// Forward notifications to one observer until it disconnects.
async fn handle_observer(
    stream: TcpStream,
    mut notify_rx: broadcast::Receiver<Notification>,
    next_id: Arc<AtomicU64>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            note = notify_rx.recv() => {
                match note {
                    Ok(notification) => {
                        let record = ObserverRecord {
                            id: next_id.fetch_add(1, Ordering::SeqCst),
                            notification: &notification,
                        };
                        let json = serde_json::to_string(&record)
                            .unwrap_or_else(|_| String::from("{}"));
                        sink.send(WsMessage::Text(json)).await?;
                    }
                    // A slow observer misses entries rather than stalling the feed.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Observer lagged, skipped {} notifications", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(WsMessage::Ping(payload))) => {
                        sink.send(WsMessage::Pong(payload)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    // Observers are read-only; anything else is ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_shape() {
        let note = Notification {
            client_id: 3,
            kind: "Password correct",
            content: Some("3".to_string()),
            input: false,
        };
        let record = ObserverRecord {
            id: 7,
            notification: &note,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["clientId"], 3);
        assert_eq!(json["type"], "Password correct");
        assert_eq!(json["content"], "3");
        assert_eq!(json["input"], false);
    }

    #[test]
    fn test_absent_content_is_omitted() {
        let note = Notification {
            client_id: 1,
            kind: "Connected",
            content: None,
            input: true,
        };
        let json = serde_json::to_string(&ObserverRecord {
            id: 0,
            notification: &note,
        })
        .unwrap();

        assert!(!json.contains("content"));
    }

    #[tokio::test]
    async fn test_feed_delivers_stamped_records() {
        let (notify_tx, _) = broadcast::channel(16);
        let server = ObserverServer::bind("127.0.0.1:0".parse().unwrap(), notify_tx.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let url = format!("ws://{}", addr);
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        notify_tx
            .send(Notification {
                client_id: 5,
                kind: "Move",
                content: Some("apple".to_string()),
                input: true,
            })
            .unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(json["id"], 0);
        assert_eq!(json["clientId"], 5);
        assert_eq!(json["type"], "Move");
        assert_eq!(json["input"], true);
    }
}
