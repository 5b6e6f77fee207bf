//! In-memory presence registry: which connections watch which resources,
//! and which identity to show for each.
//!
//! One mutex, one map. Every operation acquires the lock only for the
//! duration of the map mutation — authorization checks and display-name
//! lookups happen in the session layer, never under this lock.
//!
//! Departure semantics: a user is announced as gone from a resource only
//! when their *last* watching connection for it disappears. A user with
//! the same board open in two tabs does not "leave" when closing one.
//! Both [`PresenceRegistry::leave`] and
//! [`PresenceRegistry::remove_connection`] perform that check internally
//! so callers cannot get it wrong.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::protocol::{ResourceRef, Watcher};

/// One connection's presence: its identity and watch set.
///
/// Exists iff the connection has joined at least one resource; removed
/// the instant the watch set empties.
struct PresenceEntry {
    user_id: Uuid,
    display_name: String,
    watching: HashSet<ResourceRef>,
}

/// Registry of live watchers, keyed by connection id.
///
/// Explicitly constructed and shared via `Arc`; all mutation goes through
/// the four operations below, guarded by a single mutex.
pub struct PresenceRegistry {
    entries: Mutex<HashMap<Uuid, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `connection` watches `resource` under the given
    /// identity. Idempotent: joining the same resource twice is a single
    /// watch edge. No broadcast; that is the caller's responsibility.
    pub async fn add(
        &self,
        resource: ResourceRef,
        connection: Uuid,
        user_id: Uuid,
        display_name: &str,
    ) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(connection).or_insert_with(|| PresenceEntry {
            user_id,
            display_name: display_name.to_owned(),
            watching: HashSet::new(),
        });
        entry.watching.insert(resource);
    }

    /// Remove the connection's entire entry.
    ///
    /// Returns the resources for which a departure announcement is due:
    /// those the connection watched where no other connection of the same
    /// user remains. Safe no-op (empty vec) for unknown connections.
    pub async fn remove_connection(&self, connection: Uuid) -> Vec<ResourceRef> {
        let mut entries = self.entries.lock().await;
        let Some(removed) = entries.remove(&connection) else {
            return Vec::new();
        };
        removed
            .watching
            .into_iter()
            .filter(|resource| {
                !entries
                    .values()
                    .any(|e| e.user_id == removed.user_id && e.watching.contains(resource))
            })
            .collect()
    }

    /// Remove one resource from a connection's watch set, deleting the
    /// entry entirely if the set empties.
    ///
    /// Returns the user id only when removal occurred *and* this was the
    /// user's last watching connection for that resource, exactly the
    /// cases where a departure should be announced. `None` otherwise,
    /// including when the connection was not watching at all.
    pub async fn leave(&self, resource: ResourceRef, connection: Uuid) -> Option<Uuid> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&connection)?;
        if !entry.watching.remove(&resource) {
            return None;
        }
        let user_id = entry.user_id;
        if entry.watching.is_empty() {
            entries.remove(&connection);
        }
        let still_watching = entries
            .values()
            .any(|e| e.user_id == user_id && e.watching.contains(&resource));
        (!still_watching).then_some(user_id)
    }

    /// Identities currently watching `resource`, deduplicated by user.
    /// Order is not specified.
    pub async fn snapshot(&self, resource: ResourceRef) -> Vec<Watcher> {
        let entries = self.entries.lock().await;
        let mut seen = HashSet::new();
        entries
            .values()
            .filter(|e| e.watching.contains(&resource))
            .filter(|e| seen.insert(e.user_id))
            .map(|e| Watcher {
                user_id: e.user_id,
                display_name: e.display_name.clone(),
            })
            .collect()
    }

    /// Distinct users currently watching `resource`.
    pub async fn watcher_count(&self, resource: ResourceRef) -> usize {
        self.snapshot(resource).await.len()
    }

    /// Connections with at least one watched resource.
    pub async fn connection_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
