//! WebSocket collaboration server.
//!
//! One spawned task per accepted socket. The auth token rides on the
//! upgrade URL (`?token=…`) and is resolved to claims exactly once, at
//! connect time; joins re-check authorization per resource against those
//! claims.
//!
//! Write path: a per-connection mpsc outbox feeds a single writer task
//! that owns the socket's sink, so private replies and group fan-out
//! never interleave mid-frame. Each joined group gets a forwarder task
//! pumping that group's broadcast receiver into the outbox, skipping
//! frames whose exclusion tag names this connection. Slow connections
//! lag and drop frames rather than stalling the group.
//!
//! Teardown runs on every exit path — clean close, protocol error, or a
//! dropped socket — and is best-effort: presence cleanup failures are
//! logged, never allowed to block the close.
//!
//! Reference: Kleppmann — Designing Data-Intensive Applications, Chapter 8

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::access::{AccessGate, Authenticator, Directory};
use crate::broadcast::{Frame, GroupBroadcaster};
use crate::notify::ChangePublisher;
use crate::presence::PresenceRegistry;
use crate::protocol::{ClientMessage, ResourceRef, ServerEvent};
use crate::session::{Activity, Session};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Broadcast channel capacity per group (frames buffered per
    /// receiver before lagging sets in).
    pub broadcast_capacity: usize,
    /// Per-connection outbox capacity.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9480".to_string(),
            broadcast_capacity: 256,
            outbox_capacity: 256,
        }
    }
}

/// Server-wide counters.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_received: u64,
}

/// The collaboration server for boards and notebooks.
pub struct CollabServer<A, G, D> {
    config: ServerConfig,
    auth: Arc<A>,
    gate: Arc<G>,
    directory: Arc<D>,
    registry: Arc<PresenceRegistry>,
    broadcaster: Arc<GroupBroadcaster>,
    stats: Arc<RwLock<ServerStats>>,
}

impl<A: Authenticator, G: AccessGate, D: Directory> CollabServer<A, G, D> {
    pub fn new(config: ServerConfig, auth: Arc<A>, gate: Arc<G>, directory: Arc<D>) -> Self {
        let broadcaster = Arc::new(GroupBroadcaster::new(config.broadcast_capacity));
        Self {
            config,
            auth,
            gate,
            directory,
            registry: Arc::new(PresenceRegistry::new()),
            broadcaster,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Handle the CRUD services use to push change notifications into
    /// this server's groups. Cloneable, independent of any connection.
    pub fn change_publisher(&self) -> ChangePublisher {
        ChangePublisher::new(self.broadcaster.clone())
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<GroupBroadcaster> {
        &self.broadcaster
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Accept connections forever. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let config = self.config.clone();
            let auth = self.auth.clone();
            let gate = self.gate.clone();
            let directory = self.directory.clone();
            let registry = self.registry.clone();
            let broadcaster = self.broadcaster.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(
                    stream, addr, config, auth, gate, directory, registry, broadcaster, stats,
                )
                .await
                {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        config: ServerConfig,
        auth: Arc<A>,
        gate: Arc<G>,
        directory: Arc<D>,
        registry: Arc<PresenceRegistry>,
        broadcaster: Arc<GroupBroadcaster>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Pull the token off the upgrade request while accepting.
        let mut token: Option<String> = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            token = req.uri().query().and_then(token_from_query);
            Ok(resp)
        };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;

        let claims = match token.as_deref() {
            Some(t) => auth.authenticate(t).await,
            None => None,
        };

        let connection_id = Uuid::new_v4();
        log::info!(
            "connection {connection_id} established from {addr} (user: {})",
            claims.map_or_else(|| "anonymous".to_string(), |u| u.to_string()),
        );

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let session = Session::new(
            connection_id,
            claims,
            registry,
            broadcaster.clone(),
            gate,
            directory,
        );

        let (ws_sender, mut ws_receiver) = ws_stream.split();

        // Single writer task owns the sink; everything else goes through
        // the outbox.
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(config.outbox_capacity);
        tokio::spawn(async move {
            let mut ws_sender = ws_sender;
            while let Some(msg) = out_rx.recv().await {
                if ws_sender.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        // One forwarder per joined resource, keyed for replace-on-rejoin
        // and abort-on-leave.
        let mut forwarders: HashMap<ResourceRef, tokio::task::JoinHandle<()>> = HashMap::new();

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    let bytes: Vec<u8> = data.into();
                    {
                        let mut s = stats.write().await;
                        s.messages_received += 1;
                    }

                    match ClientMessage::decode(&bytes) {
                        Ok(ClientMessage::Join { resource }) => {
                            match session.join(resource).await {
                                Ok((rx, watchers)) => {
                                    // A rejoin replaces the old
                                    // subscription so no frame is ever
                                    // delivered twice; a denied rejoin
                                    // leaves existing membership alone.
                                    if let Some(old) = forwarders.remove(&resource) {
                                        old.abort();
                                    }
                                    forwarders.insert(
                                        resource,
                                        spawn_forwarder(rx, out_tx.clone(), connection_id),
                                    );
                                    let listing = ServerEvent::PresenceList { resource, watchers };
                                    if !send_event(&out_tx, &listing).await {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    log::info!(
                                        "join denied on {resource} for connection {connection_id}: {err}"
                                    );
                                    let denied = ServerEvent::JoinDenied {
                                        resource,
                                        reason: err.reason(),
                                    };
                                    if !send_event(&out_tx, &denied).await {
                                        break;
                                    }
                                }
                            }
                        }

                        Ok(ClientMessage::Leave { resource }) => {
                            if let Some(handle) = forwarders.remove(&resource) {
                                handle.abort();
                            }
                            session.leave(resource).await;
                            broadcaster.remove_if_idle(&resource).await;
                        }

                        Ok(ClientMessage::CursorPosition { resource, x, y }) => {
                            session.activity(resource, Activity::Cursor { x, y }).await;
                        }

                        Ok(ClientMessage::FocusingItem { resource, item }) => {
                            session.activity(resource, Activity::Focus { item }).await;
                        }

                        Err(e) => {
                            log::warn!("undecodable frame from {addr}: {e}");
                        }
                    }
                }

                Ok(Message::Ping(data)) => {
                    if out_tx.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }

                Ok(Message::Close(_)) => {
                    log::info!("connection {connection_id} closed by peer");
                    break;
                }

                Ok(_) => {}

                Err(e) => {
                    log::warn!("websocket error on connection {connection_id}: {e}");
                    break;
                }
            }
        }

        // Teardown: runs for clean closes and dropped sockets alike.
        let watched: Vec<ResourceRef> = forwarders.keys().copied().collect();
        for (_, handle) in forwarders.drain() {
            handle.abort();
        }
        session.disconnect().await;
        for resource in &watched {
            broadcaster.remove_if_idle(resource).await;
        }

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }
        log::info!("connection {connection_id} from {addr} closed");

        Ok(())
    }
}

/// Pump one group's frames into the connection's outbox, honoring the
/// exclusion tag. Aborted on leave/disconnect; exits on its own when the
/// outbox or the group channel closes.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Frame>,
    out_tx: mpsc::Sender<Message>,
    connection_id: Uuid,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if frame.exclude == Some(connection_id) {
                        continue;
                    }
                    let msg = Message::Binary(frame.bytes.to_vec().into());
                    if out_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Dropped frames are gone for good; presence heals on
                    // the next join, ephemeral relays were best-effort.
                    log::warn!("connection {connection_id} lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Encode and queue a private event; false when the connection is gone.
async fn send_event(out_tx: &mpsc::Sender<Message>, event: &ServerEvent) -> bool {
    match event.encode() {
        Ok(bytes) => out_tx.send(Message::Binary(bytes.into())).await.is_ok(),
        Err(e) => {
            log::error!("failed to encode {}: {e}", event.name());
            true
        }
    }
}

fn token_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
