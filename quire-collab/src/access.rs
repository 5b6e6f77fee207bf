//! Boundary to the rest of the application: authorization, user lookup,
//! and token resolution.
//!
//! In production these are backed by the CRUD data store and the auth
//! service. The collaboration layer only sees the three traits below,
//! consumed as generic parameters; the in-memory implementations serve
//! tests and local development.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::ResourceRef;

/// Answers "may this user read this resource?".
///
/// An unknown resource yields `false`, never an error; callers cannot
/// tell a missing board from a forbidden one.
pub trait AccessGate: Send + Sync + 'static {
    fn has_read_access(
        &self,
        user_id: Uuid,
        resource: ResourceRef,
    ) -> impl Future<Output = bool> + Send;
}

/// Resolves a user's display name.
///
/// `None` means no stored profile; callers fall back to the raw id.
pub trait Directory: Send + Sync + 'static {
    fn display_name(&self, user_id: Uuid) -> impl Future<Output = Option<String>> + Send;
}

/// Resolves the transport's auth token into a user id, once per
/// connection. Token issuance lives elsewhere; an expired or unknown
/// token is simply `None` and the connection stays unauthenticated.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, token: &str) -> impl Future<Output = Option<Uuid>> + Send;
}

/// In-memory access gate: an explicit grant table.
#[derive(Default)]
pub struct MemoryGate {
    grants: RwLock<HashMap<Uuid, HashSet<ResourceRef>>>,
}

impl MemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, user_id: Uuid, resource: ResourceRef) {
        self.grants
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(resource);
    }

    pub async fn revoke(&self, user_id: Uuid, resource: ResourceRef) {
        if let Some(resources) = self.grants.write().await.get_mut(&user_id) {
            resources.remove(&resource);
        }
    }
}

impl AccessGate for MemoryGate {
    async fn has_read_access(&self, user_id: Uuid, resource: ResourceRef) -> bool {
        self.grants
            .read()
            .await
            .get(&user_id)
            .is_some_and(|resources| resources.contains(&resource))
    }
}

/// In-memory directory of display names.
#[derive(Default)]
pub struct MemoryDirectory {
    names: RwLock<HashMap<Uuid, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: Uuid, display_name: impl Into<String>) {
        self.names.write().await.insert(user_id, display_name.into());
    }
}

impl Directory for MemoryDirectory {
    async fn display_name(&self, user_id: Uuid) -> Option<String> {
        self.names.read().await.get(&user_id).cloned()
    }
}

/// In-memory token table mapping opaque tokens to user ids.
#[derive(Default)]
pub struct TokenTable {
    tokens: RwLock<HashMap<String, Uuid>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue(&self, token: impl Into<String>, user_id: Uuid) {
        self.tokens.write().await.insert(token.into(), user_id);
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }
}

impl Authenticator for TokenTable {
    async fn authenticate(&self, token: &str) -> Option<Uuid> {
        self.tokens.read().await.get(token).copied()
    }
}
