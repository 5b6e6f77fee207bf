//! Minimal protocol client.
//!
//! Connects to a collaboration server with an auth token, sends
//! join/leave/activity messages, and surfaces decoded server events on a
//! channel. Used by the integration suite and by operational tooling;
//! the production web client speaks the same wire protocol from the
//! browser.
//!
//! There is deliberately no offline queue: everything on this channel is
//! either answered at join time or ephemeral by contract.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{ClientMessage, ResourceRef, ServerEvent};

/// Client-side connection errors.
#[derive(Debug, Clone)]
pub enum ClientError {
    /// The WebSocket connect/upgrade failed.
    Connect(String),
    /// The connection is gone; the message was not sent.
    Closed,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ClientError {}

/// A live connection to a collaboration server.
///
/// Dropping the client closes the connection, which on the server side
/// triggers full presence cleanup for it.
pub struct CollabClient {
    out_tx: mpsc::Sender<ClientMessage>,
}

impl CollabClient {
    /// Connect and authenticate. Returns the client plus the stream of
    /// decoded server events.
    ///
    /// `server_url` is the bare endpoint (`ws://host:port`); the token is
    /// appended as a query parameter, which is where the server looks for
    /// it during the upgrade.
    pub async fn connect(
        server_url: &str,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let url = format!("{server_url}/?token={token}");
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut ws_sink, mut ws_source) = ws_stream.split();

        // Reader task: decode binary frames into events.
        let (event_tx, event_rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Some(msg) = ws_source.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ServerEvent::decode(&bytes) {
                            Ok(event) => {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("undecodable server frame: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        // Writer task: encode and send outgoing messages.
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(64);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let bytes = match msg.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::error!("failed to encode client message: {e}");
                        continue;
                    }
                };
                if ws_sink.send(Message::Binary(bytes.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        Ok((Self { out_tx }, event_rx))
    }

    /// Start watching a resource; the server answers with either
    /// `PresenceList` or `JoinDenied` on the event stream.
    pub async fn join(&self, resource: ResourceRef) -> Result<(), ClientError> {
        self.send(ClientMessage::Join { resource }).await
    }

    /// Stop watching a resource.
    pub async fn leave(&self, resource: ResourceRef) -> Result<(), ClientError> {
        self.send(ClientMessage::Leave { resource }).await
    }

    /// Best-effort cursor position relay.
    pub async fn cursor(&self, resource: ResourceRef, x: f32, y: f32) -> Result<(), ClientError> {
        self.send(ClientMessage::CursorPosition { resource, x, y }).await
    }

    /// Best-effort "focused on this item" relay.
    pub async fn focus(&self, resource: ResourceRef, item: Uuid) -> Result<(), ClientError> {
        self.send(ClientMessage::FocusingItem { resource, item }).await
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.out_tx.send(msg).await.map_err(|_| ClientError::Closed)
    }
}
