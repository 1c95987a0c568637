//! Self-healing for the discovery listing.
//!
//! Every existing room must eventually have exactly one listing under
//! `available/`. Someone deleting only the listing leaves the room
//! unfindable, so this guard watches the collection and rewrites a
//! default entry whenever its room's id is observed absent. Pure
//! "observed absent → write"; no further state.

use tokio::task::JoinHandle;

use watchparty_store::RealtimeStore;

use crate::paths;
use crate::records::RoomListing;

pub struct RoomLifecycleGuard {
    task: JoinHandle<()>,
}

impl RoomLifecycleGuard {
    /// Watch the listing collection for `room_id` while the room is in
    /// active use. Dropping the guard stops the reconciliation.
    pub fn spawn(store: RealtimeStore, room_id: impl Into<String>) -> Self {
        let room_id = room_id.into();
        let mut available_rx = store.watch(&paths::available());
        let task = tokio::spawn(async move {
            loop {
                let missing = !available_rx.borrow_and_update().has_child(&room_id);
                if missing {
                    tracing::info!(room_id = %room_id, "discovery listing missing, restoring default");
                    store.set(
                        &paths::listing(&room_id),
                        RoomListing::placeholder().into_value(),
                    );
                }
                if available_rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Self { task }
    }
}

impl Drop for RoomLifecycleGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
