//! Per-connection protocol endpoint.
//!
//! A [`Session`] is created once per accepted socket with whatever claims
//! the transport resolved at connect time. It owns no transport state;
//! the server layer holds the socket and the group receivers, the session
//! mutates the presence registry and triggers broadcasts.
//!
//! Per resource, a connection moves Unjoined → Joining (gate check in
//! flight) → Watching, independently for each resource it has open, and
//! ends Closed with no trace left in the registry. Authorization runs on
//! every join — access can differ per resource and can be revoked between
//! joins — but not on ephemeral activity, which rides on the membership
//! established at join time.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::access::{AccessGate, Directory};
use crate::broadcast::{Frame, GroupBroadcaster};
use crate::presence::PresenceRegistry;
use crate::protocol::{DeniedReason, ResourceRef, ServerEvent, Watcher};

/// Why a join was refused. Surfaced to the caller as a `JoinDenied`
/// event so the client can tell "not logged in" from "not permitted";
/// unknown resources deliberately look like `AccessDenied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The connection carries no authenticated user.
    Unauthenticated,
    /// The access gate refused read access (or the resource is unknown).
    AccessDenied,
}

impl JoinError {
    pub fn reason(&self) -> DeniedReason {
        match self {
            JoinError::Unauthenticated => DeniedReason::Unauthenticated,
            JoinError::AccessDenied => DeniedReason::AccessDenied,
        }
    }
}

impl std::fmt::Display for JoinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "join requires an authenticated connection"),
            Self::AccessDenied => write!(f, "read access denied"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Ephemeral activity relayed live to a group, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity {
    Cursor { x: f32, y: f32 },
    Focus { item: Uuid },
}

/// The authenticated per-connection endpoint.
pub struct Session<G, D> {
    connection_id: Uuid,
    /// User id resolved from the transport's claims at connect time.
    claims: Option<Uuid>,
    registry: Arc<PresenceRegistry>,
    broadcaster: Arc<GroupBroadcaster>,
    gate: Arc<G>,
    directory: Arc<D>,
}

impl<G: AccessGate, D: Directory> Session<G, D> {
    pub fn new(
        connection_id: Uuid,
        claims: Option<Uuid>,
        registry: Arc<PresenceRegistry>,
        broadcaster: Arc<GroupBroadcaster>,
        gate: Arc<G>,
        directory: Arc<D>,
    ) -> Self {
        Self {
            connection_id,
            claims,
            registry,
            broadcaster,
            gate,
            directory,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.claims
    }

    /// Start watching a resource.
    ///
    /// Authorization first; nothing is subscribed or registered until the
    /// gate passes, so a denied join leaves no partial state. On success
    /// the caller receives the group receiver plus the presence list to
    /// send privately (current watchers, without the joiner), and the
    /// rest of the group is sent `UserJoined` with the joiner excluded.
    ///
    /// The registry mutex is never held across the gate or directory
    /// calls; those await on the data store.
    pub async fn join(
        &self,
        resource: ResourceRef,
    ) -> Result<(broadcast::Receiver<Frame>, Vec<Watcher>), JoinError> {
        let user_id = self.claims.ok_or(JoinError::Unauthenticated)?;

        if !self.gate.has_read_access(user_id, resource).await {
            return Err(JoinError::AccessDenied);
        }

        let display_name = self
            .directory
            .display_name(user_id)
            .await
            .unwrap_or_else(|| user_id.to_string());

        let receiver = self.broadcaster.subscribe(&resource).await;
        self.registry
            .add(resource, self.connection_id, user_id, &display_name)
            .await;

        // Snapshot after our own registration; the joiner is filtered out
        // of their private list.
        let watchers: Vec<Watcher> = self
            .registry
            .snapshot(resource)
            .await
            .into_iter()
            .filter(|w| w.user_id != user_id)
            .collect();

        let joined = ServerEvent::UserJoined {
            resource,
            user_id,
            display_name: display_name.clone(),
        };
        if let Err(e) = self
            .broadcaster
            .broadcast_excluding(&resource, &joined, self.connection_id)
            .await
        {
            log::warn!("failed to announce join on {resource}: {e}");
        }

        log::info!("{display_name} ({user_id}) joined {resource}");
        Ok((receiver, watchers))
    }

    /// Stop watching a resource. Announces `UserLeft` only when this was
    /// the user's last watching connection for it. Never an error; the
    /// caller is expected to have dropped its group receiver already.
    pub async fn leave(&self, resource: ResourceRef) -> Option<Uuid> {
        let departed = self.registry.leave(resource, self.connection_id).await;
        if let Some(user_id) = departed {
            let event = ServerEvent::UserLeft { resource, user_id };
            if let Err(e) = self.broadcaster.broadcast(&resource, &event).await {
                log::warn!("failed to announce leave on {resource}: {e}");
            }
            log::info!("{user_id} left {resource}");
        }
        departed
    }

    /// Relay an ephemeral activity message to the rest of the group.
    ///
    /// Unauthenticated connections are silently dropped: this channel is
    /// best-effort and high-frequency, not worth a protocol error. No
    /// registry access, no persistence, no retry.
    pub async fn activity(&self, resource: ResourceRef, activity: Activity) {
        let Some(user_id) = self.claims else {
            return;
        };
        let event = match activity {
            Activity::Cursor { x, y } => ServerEvent::CursorPosition { resource, user_id, x, y },
            Activity::Focus { item } => ServerEvent::FocusingItem { resource, user_id, item },
        };
        if let Err(e) = self
            .broadcaster
            .broadcast_excluding(&resource, &event, self.connection_id)
            .await
        {
            log::debug!("dropped {} relay on {resource}: {e}", event.name());
        }
    }

    /// Clean up after the socket is gone, however it went.
    ///
    /// Removes every trace of the connection from the registry and
    /// announces departure to each group where this was the user's last
    /// watching connection, using the session's own resolved user id (the
    /// registry entry is already gone). Idempotent; failures are logged
    /// and swallowed so transport teardown always completes.
    pub async fn disconnect(&self) {
        let departures = self.registry.remove_connection(self.connection_id).await;
        if departures.is_empty() {
            return;
        }
        let Some(user_id) = self.claims else {
            // Entries only exist for authenticated connections.
            return;
        };
        for resource in departures {
            let event = ServerEvent::UserLeft { resource, user_id };
            if let Err(e) = self.broadcaster.broadcast(&resource, &event).await {
                log::error!("presence cleanup broadcast failed on {resource}: {e}");
            }
        }
        log::info!("connection {} disconnected ({user_id})", self.connection_id);
    }
}
