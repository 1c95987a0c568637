//! Room directory: durable room documents and their join-request log.

use serde_json::json;

use watchparty_store::{RealtimeStore, StoreError};

use crate::paths;
use crate::records::{JoinRequest, RoomDoc, RoomListing};

#[derive(Clone)]
pub struct RoomDirectory {
    store: RealtimeStore,
}

impl RoomDirectory {
    pub fn new(store: RealtimeStore) -> Self {
        Self { store }
    }

    /// Entry point for the (out-of-scope) room-creation flow: writes the
    /// durable document and the initial discovery listing.
    pub fn create(&self, room_id: &str, owner_id: &str, name: &str) {
        self.store
            .set(&paths::room_doc(room_id), json!({ "ownerId": owner_id }));
        self.store
            .set(&paths::listing(room_id), RoomListing::new(name).into_value());
        tracing::info!(room_id = %room_id, owner_id = %owner_id, "room created");
    }

    /// Used once at entry to validate a room before any presence logic
    /// runs.
    pub fn get(&self, room_id: &str) -> Option<RoomDoc> {
        self.store
            .get(&paths::room_doc(room_id))
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn append_join_request(
        &self,
        room_id: &str,
        request: JoinRequest,
    ) -> Result<(), StoreError> {
        self.store
            .append_to_log(&paths::join_requests(room_id), request.into_value())
    }

    /// The room's join-request log, oldest first.
    pub fn join_requests(&self, room_id: &str) -> Vec<JoinRequest> {
        self.store
            .get(&paths::join_requests(room_id))
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}
