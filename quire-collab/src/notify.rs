//! Change notifications from the CRUD services.
//!
//! After a note/card/drawing mutation commits, the owning service calls
//! [`ChangePublisher::publish`] to tell live watchers that something
//! under their board or notebook changed. The publisher rides the same
//! group-broadcast path as presence events but never touches presence —
//! a change lands on whoever happens to be subscribed right now.
//!
//! Fire-and-forget by contract: a delivery problem is logged and
//! swallowed, never propagated back to the data mutation, and a group
//! with zero subscribers is a plain no-op.

use std::sync::Arc;

use uuid::Uuid;

use crate::broadcast::GroupBroadcaster;
use crate::protocol::{ChangeKind, ResourceRef, ServerEvent};

/// Cloneable handle the CRUD services hold.
#[derive(Clone)]
pub struct ChangePublisher {
    broadcaster: Arc<GroupBroadcaster>,
}

impl ChangePublisher {
    pub fn new(broadcaster: Arc<GroupBroadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Notify watchers of `resource` that `entity` changed.
    pub async fn publish(&self, resource: ResourceRef, change: ChangeKind, entity: Uuid) {
        self.publish_with_payload(resource, change, entity, None).await;
    }

    /// Same, carrying the entity (or a partial view of it) as an opaque
    /// blob serialized by the calling service.
    pub async fn publish_with_payload(
        &self,
        resource: ResourceRef,
        change: ChangeKind,
        entity: Uuid,
        payload: Option<Vec<u8>>,
    ) {
        let event = ServerEvent::ResourceChanged {
            resource,
            change,
            entity,
            payload,
        };
        match self.broadcaster.broadcast(&resource, &event).await {
            Ok(reached) => {
                log::debug!("{:?} on {resource} reached {reached} watchers", change);
            }
            Err(e) => {
                log::warn!("dropping {:?} notification on {resource}: {e}", change);
            }
        }
    }
}
