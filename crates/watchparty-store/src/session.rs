//! Connection sessions, loss detection, and the deferred-action registry.
//!
//! A `Connection` is a client's live link to the store. The client may
//! pre-register mutations against it; the store applies them itself the
//! moment it decides the connection is gone (lease expiry, forced sever,
//! or graceful close). That is the whole point of the registry: the
//! mutations run even when the client could not execute a single line of
//! shutdown code.

use std::mem::discriminant;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::store::RealtimeStore;
use crate::value::Fields;

/// This client's view of its own link to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Online,
    Disconnected,
}

#[derive(Debug, Clone)]
enum DeferredOp {
    Update(Fields),
    Remove,
}

#[derive(Debug, Clone)]
struct DeferredAction {
    path: StorePath,
    op: DeferredOp,
}

pub(crate) struct SessionEntry {
    state_tx: watch::Sender<ConnectionState>,
    deferred: Vec<DeferredAction>,
    last_seen: Instant,
    live: bool,
}

/// Lease parameters for backend-side connection-loss detection.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// How long a session may go without a heartbeat before it is severed.
    pub lease_timeout: Duration,
    /// How often the sweeper looks for lapsed leases.
    pub sweep_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(2),
        }
    }
}

/// A client's live connection handle. Clones share the same session.
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    store: RealtimeStore,
}

impl RealtimeStore {
    /// Open a new session. The returned handle is the client's identity for
    /// deferred-action registration and loss detection.
    pub fn connect(&self) -> Connection {
        let id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(ConnectionState::Online);
        self.inner.sessions.lock().insert(
            id,
            SessionEntry {
                state_tx,
                deferred: Vec::new(),
                last_seen: Instant::now(),
                live: true,
            },
        );
        tracing::debug!(connection_id = %id, "connection opened");
        Connection {
            id,
            store: self.clone(),
        }
    }

    fn with_live_session<T>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut SessionEntry) -> T,
    ) -> Result<T, StoreError> {
        let mut sessions = self.inner.sessions.lock();
        let entry = sessions
            .get_mut(&id)
            .filter(|entry| entry.live)
            .ok_or(StoreError::ConnectionLost)?;
        Ok(apply(entry))
    }

    /// At most one pending action per (path, kind); registering again
    /// replaces the earlier one in place, keeping its firing position.
    fn register_deferred(
        &self,
        id: Uuid,
        path: StorePath,
        op: DeferredOp,
    ) -> Result<(), StoreError> {
        self.with_live_session(id, |entry| {
            let slot = entry
                .deferred
                .iter()
                .position(|action| action.path == path && discriminant(&action.op) == discriminant(&op));
            match slot {
                Some(index) => entry.deferred[index].op = op,
                None => entry.deferred.push(DeferredAction { path, op }),
            }
        })
    }

    /// Drop ALL pending actions for `path`, whatever their kind. Callers
    /// must re-register anything they still want afterwards.
    fn cancel_deferred(&self, id: Uuid, path: &StorePath) -> Result<(), StoreError> {
        self.with_live_session(id, |entry| {
            entry.deferred.retain(|action| action.path != *path);
        })
    }

    fn heartbeat_session(&self, id: Uuid) {
        let mut sessions = self.inner.sessions.lock();
        if let Some(entry) = sessions.get_mut(&id)
            && entry.live
        {
            entry.last_seen = Instant::now();
        }
    }

    fn session_state(&self, id: Uuid) -> watch::Receiver<ConnectionState> {
        let sessions = self.inner.sessions.lock();
        match sessions.get(&id) {
            Some(entry) => entry.state_tx.subscribe(),
            None => watch::channel(ConnectionState::Disconnected).1,
        }
    }

    /// Backend-side loss detection: flip the session dead and fire its
    /// pending actions, in registration order, through the normal mutation
    /// path so watchers observe the effects. The `live` flag makes this
    /// exactly-once; a second detection is a no-op.
    pub(crate) fn sever_session(&self, id: Uuid) {
        let pending = {
            let mut sessions = self.inner.sessions.lock();
            let Some(entry) = sessions.get_mut(&id) else {
                return;
            };
            if !entry.live {
                return;
            }
            entry.live = false;
            entry.state_tx.send_replace(ConnectionState::Disconnected);
            std::mem::take(&mut entry.deferred)
        };

        tracing::info!(
            connection_id = %id,
            actions = pending.len(),
            "connection lost, firing deferred actions"
        );
        for action in pending {
            match action.op {
                DeferredOp::Update(fields) => {
                    if let Err(err) = self.update(&action.path, &fields) {
                        tracing::warn!(path = %action.path, error = %err, "deferred update skipped");
                    }
                }
                DeferredOp::Remove => self.remove(&action.path),
            }
        }
    }

    /// Sever every live session whose lease has lapsed. Returns how many.
    pub fn expire_stale(&self, lease_timeout: Duration) -> usize {
        let stale: Vec<Uuid> = {
            let sessions = self.inner.sessions.lock();
            sessions
                .iter()
                .filter(|(_, entry)| entry.live && entry.last_seen.elapsed() > lease_timeout)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &stale {
            self.sever_session(*id);
        }
        stale.len()
    }
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connect/disconnect transitions for this session.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.store.session_state(self.id)
    }

    /// Refresh the lease.
    pub fn heartbeat(&self) {
        self.store.heartbeat_session(self.id);
    }

    /// Spawn a task that heartbeats until the session disconnects. If the
    /// process dies, so does the task, and the lease sweeper reaps the
    /// session server-side.
    pub fn spawn_keepalive(&self, every: Duration) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move {
            let state = connection.state();
            loop {
                tokio::time::sleep(every).await;
                if *state.borrow() == ConnectionState::Disconnected {
                    break;
                }
                connection.heartbeat();
            }
        })
    }

    /// Start registering deferred actions against `path`.
    pub fn on_disconnect(&self, path: StorePath) -> OnDisconnect<'_> {
        OnDisconnect {
            connection: self,
            path,
        }
    }

    /// Force backend-side loss detection now. Used by tests to simulate a
    /// crash; the lease sweeper takes this same path for real ones.
    pub fn sever(&self) {
        self.store.sever_session(self.id);
    }

    /// Graceful shutdown. The store treats it exactly like a detected
    /// loss: pending deferred actions still fire.
    pub fn close(&self) {
        self.store.sever_session(self.id);
    }
}

/// Builder over one (connection, path) pair.
pub struct OnDisconnect<'a> {
    connection: &'a Connection,
    path: StorePath,
}

impl OnDisconnect<'_> {
    /// On disconnect, merge `fields` into the object at this path.
    pub fn update(&self, fields: Fields) -> Result<(), StoreError> {
        self.connection.store.register_deferred(
            self.connection.id,
            self.path.clone(),
            DeferredOp::Update(fields),
        )
    }

    /// On disconnect, remove the subtree at this path.
    pub fn remove(&self) -> Result<(), StoreError> {
        self.connection.store.register_deferred(
            self.connection.id,
            self.path.clone(),
            DeferredOp::Remove,
        )
    }

    /// Clear every pending action for this path, all kinds.
    pub fn cancel(&self) -> Result<(), StoreError> {
        self.connection
            .store
            .cancel_deferred(self.connection.id, &self.path)
    }
}

/// Periodically reap sessions whose lease lapsed.
pub fn run_lease_sweeper(store: RealtimeStore, config: LeaseConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        loop {
            ticker.tick().await;
            let reaped = store.expire_stale(config.lease_timeout);
            if reaped > 0 {
                tracing::debug!(reaped, "lease sweep severed stale connections");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldValue, field};
    use serde_json::json;

    #[test]
    fn deferred_actions_fire_on_sever() {
        let store = RealtimeStore::new();
        store.set(&"rooms/x".into(), json!({ "userCount": 2 }));
        store.set(&"rooms/x/alice".into(), json!({ "name": "Alice" }));

        let conn = store.connect();
        conn.on_disconnect("rooms/x".into())
            .update(field("userCount", FieldValue::Increment(-1)))
            .unwrap();
        conn.on_disconnect("rooms/x/alice".into()).remove().unwrap();

        conn.sever();
        assert_eq!(store.get(&"rooms/x/userCount".into()), Some(json!(1)));
        assert_eq!(store.get(&"rooms/x/alice".into()), None);
    }

    #[test]
    fn severing_twice_fires_only_once() {
        let store = RealtimeStore::new();
        store.set(&"rooms/x".into(), json!({ "userCount": 2 }));

        let conn = store.connect();
        conn.on_disconnect("rooms/x".into())
            .update(field("userCount", FieldValue::Increment(-1)))
            .unwrap();

        conn.sever();
        conn.sever();
        assert_eq!(store.get(&"rooms/x/userCount".into()), Some(json!(1)));
    }

    #[test]
    fn reregistering_replaces_the_pending_action() {
        let store = RealtimeStore::new();
        let conn = store.connect();

        conn.on_disconnect("flags/x".into())
            .update(field("left", FieldValue::Set(json!("early"))))
            .unwrap();
        conn.on_disconnect("flags/x".into())
            .update(field("left", FieldValue::Set(json!("late"))))
            .unwrap();

        conn.sever();
        assert_eq!(store.get(&"flags/x/left".into()), Some(json!("late")));
    }

    #[test]
    fn cancel_clears_all_kinds_for_the_path() {
        let store = RealtimeStore::new();
        store.set(&"rooms/x".into(), json!({ "userCount": 1 }));

        let conn = store.connect();
        conn.on_disconnect("rooms/x".into())
            .update(field("userCount", FieldValue::Increment(-1)))
            .unwrap();
        conn.on_disconnect("rooms/x".into()).remove().unwrap();
        conn.on_disconnect("rooms/x".into()).cancel().unwrap();

        conn.sever();
        assert_eq!(store.get(&"rooms/x/userCount".into()), Some(json!(1)));
    }

    #[test]
    fn registration_on_a_severed_connection_errors() {
        let store = RealtimeStore::new();
        let conn = store.connect();
        conn.sever();
        let err = conn
            .on_disconnect("rooms/x".into())
            .remove()
            .unwrap_err();
        assert!(matches!(err, StoreError::ConnectionLost));
    }

    #[test]
    fn state_watch_reports_the_transition() {
        let store = RealtimeStore::new();
        let conn = store.connect();
        let state = conn.state();
        assert_eq!(*state.borrow(), ConnectionState::Online);
        conn.sever();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn lease_expiry_severs_quiet_sessions() {
        let store = RealtimeStore::new();
        store.set(&"rooms/x".into(), json!({ "userCount": 1 }));

        let quiet = store.connect();
        quiet
            .on_disconnect("rooms/x".into())
            .update(field("userCount", FieldValue::Increment(-1)))
            .unwrap();
        let chatty = store.connect();

        std::thread::sleep(Duration::from_millis(5));
        chatty.heartbeat();
        let reaped = store.expire_stale(Duration::from_millis(1));

        assert_eq!(reaped, 1);
        assert_eq!(store.get(&"rooms/x/userCount".into()), Some(json!(0)));
        assert_eq!(*chatty.state().borrow(), ConnectionState::Online);
    }
}
