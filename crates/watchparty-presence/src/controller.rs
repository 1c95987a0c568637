//! The presence core: keep this client in the room's roster while its
//! connection lives, and keep the right cleanup armed store-side at all
//! times, so the bookkeeping survives a client that dies without running
//! any code.

use std::collections::HashMap;

use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use watchparty_store::{
    Connection, ConnectionState, FieldValue, RealtimeStore, Snapshot, StoreError, field,
};

use crate::arming::{ArmingCommand, ArmingState};
use crate::directory::RoomDirectory;
use crate::error::PresenceError;
use crate::paths;
use crate::profiles::UserProfiles;
use crate::records::JoinRequest;

/// Live roster: `userId -> displayName`.
pub type Roster = HashMap<String, String>;

#[derive(Clone)]
pub struct PresenceController {
    store: RealtimeStore,
    directory: RoomDirectory,
    profiles: UserProfiles,
}

impl PresenceController {
    pub fn new(store: RealtimeStore) -> Self {
        Self {
            directory: RoomDirectory::new(store.clone()),
            profiles: UserProfiles::new(store.clone()),
            store,
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn profiles(&self) -> &UserProfiles {
        &self.profiles
    }

    /// Entry protocol. Validates the room, subscribes to the roster and
    /// the live count, joins if absent, applies the first arming plan,
    /// and spawns the watcher tasks. The returned handle is ready: its
    /// roster and count are safe to read immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn enter(
        &self,
        connection: &Connection,
        room_id: &str,
        user_id: &str,
    ) -> Result<PresenceHandle, PresenceError> {
        let doc = self
            .directory
            .get(room_id)
            .ok_or_else(|| PresenceError::RoomNotFound(room_id.to_owned()))?;

        let mut room_rx = self.store.watch(&paths::room(room_id));
        let mut count_store_rx = self.store.watch_field(&paths::user_count(room_id));

        // Join guarded by roster absence, so a reconnect or a duplicate
        // snapshot delivery never re-increments the count.
        let initial = room_rx.borrow_and_update().clone();
        if !initial.has_child(user_id) {
            self.join(room_id, user_id)?;
        }

        let snapshot = room_rx.borrow_and_update().clone();
        let (roster_tx, roster_rx) = watch::channel(roster_of(&snapshot));

        // We are an established member now; arm cleanup from the freshest
        // count before anything is handed to the caller.
        let count = read_count(&count_store_rx.borrow_and_update());
        let (arming, commands) = ArmingState::default().step(count);
        apply_arming(connection, room_id, user_id, &commands)?;
        let (count_tx, count_rx) = watch::channel(count);

        tracing::info!(room_id = %room_id, user_id = %user_id, count, "presence ready");

        let mut tasks = Vec::new();
        tasks.push(self.spawn_roster_watch(
            connection,
            room_id,
            user_id,
            room_rx,
            roster_tx,
        ));
        tasks.push(spawn_count_watch(
            connection,
            room_id,
            user_id,
            arming,
            count_store_rx,
            count_tx,
        ));

        Ok(PresenceHandle {
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
            owner_id: doc.owner_id,
            roster_rx,
            count_rx,
            tasks,
        })
    }

    /// Publish self into the roster: membership entry, count increment,
    /// join-request log entry. If the increment fails after the entry was
    /// written, the entry is rolled back so "present in roster ⇔ counted"
    /// is never silently broken.
    fn join(&self, room_id: &str, user_id: &str) -> Result<(), PresenceError> {
        let name = self
            .profiles
            .display_name(user_id)
            .ok_or_else(|| PresenceError::DisplayNameUnavailable(user_id.to_owned()))?;

        let member = paths::member(room_id, user_id);
        self.store.set(&member, json!({ "name": name }));
        if let Err(err) = self.store.atomic_increment(&paths::user_count(room_id)) {
            self.store.remove(&member);
            return Err(err.into());
        }
        self.directory
            .append_join_request(room_id, JoinRequest::join(user_id))?;

        tracing::info!(room_id = %room_id, user_id = %user_id, name = %name, "joined room");
        Ok(())
    }

    /// Rebuild the roster on every snapshot, and rejoin if our entry has
    /// gone missing while our connection is still live.
    fn spawn_roster_watch(
        &self,
        connection: &Connection,
        room_id: &str,
        user_id: &str,
        mut room_rx: watch::Receiver<Snapshot>,
        roster_tx: watch::Sender<Roster>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        let room_id = room_id.to_owned();
        let user_id = user_id.to_owned();
        let mut conn_rx = connection.state();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = room_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = room_rx.borrow_and_update().clone();
                        roster_tx.send_replace(roster_of(&snapshot));
                        if *conn_rx.borrow() == ConnectionState::Disconnected {
                            break;
                        }
                        if !snapshot.has_child(&user_id)
                            && let Err(err) = controller.join(&room_id, &user_id)
                        {
                            tracing::warn!(
                                room_id = %room_id,
                                user_id = %user_id,
                                error = %err,
                                "rejoin failed"
                            );
                        }
                    }
                    state = conn_rx.changed() => {
                        if state.is_err() || *conn_rx.borrow() == ConnectionState::Disconnected {
                            tracing::debug!(
                                room_id = %room_id,
                                user_id = %user_id,
                                "connection lost, stopping roster watch"
                            );
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Re-derive the arming plan from the freshest count on every change and
/// apply it before the new count is published to consumers. The plan is
/// never computed from a captured earlier value.
fn spawn_count_watch(
    connection: &Connection,
    room_id: &str,
    user_id: &str,
    initial: ArmingState,
    mut count_store_rx: watch::Receiver<Option<Value>>,
    count_tx: watch::Sender<i64>,
) -> JoinHandle<()> {
    let connection = connection.clone();
    let room_id = room_id.to_owned();
    let user_id = user_id.to_owned();
    let mut conn_rx = connection.state();
    tokio::spawn(async move {
        let mut arming = initial;
        loop {
            tokio::select! {
                changed = count_store_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let count = read_count(&count_store_rx.borrow_and_update());
                    let (next, commands) = arming.step(count);
                    arming = next;
                    match apply_arming(&connection, &room_id, &user_id, &commands) {
                        Ok(()) => {}
                        Err(StoreError::ConnectionLost) => break,
                        Err(err) => {
                            tracing::warn!(room_id = %room_id, error = %err, "re-arming failed");
                        }
                    }
                    count_tx.send_replace(count);
                }
                state = conn_rx.changed() => {
                    if state.is_err() || *conn_rx.borrow() == ConnectionState::Disconnected {
                        break;
                    }
                }
            }
        }
    })
}

fn apply_arming(
    connection: &Connection,
    room_id: &str,
    user_id: &str,
    commands: &[ArmingCommand],
) -> Result<(), StoreError> {
    for command in commands {
        match command {
            ArmingCommand::ArmBaseline => {
                connection
                    .on_disconnect(paths::room(room_id))
                    .update(field(paths::USER_COUNT_KEY, FieldValue::Increment(-1)))?;
                connection
                    .on_disconnect(paths::member(room_id, user_id))
                    .remove()?;
            }
            ArmingCommand::ArmTerminal => {
                connection.on_disconnect(paths::room(room_id)).remove()?;
                connection.on_disconnect(paths::listing(room_id)).remove()?;
                connection.on_disconnect(paths::chat(room_id)).remove()?;
            }
            ArmingCommand::CancelTerminal => {
                connection.on_disconnect(paths::room(room_id)).cancel()?;
                connection.on_disconnect(paths::listing(room_id)).cancel()?;
                connection.on_disconnect(paths::chat(room_id)).cancel()?;
            }
        }
    }
    Ok(())
}

fn read_count(value: &Option<Value>) -> i64 {
    value.as_ref().and_then(Value::as_i64).unwrap_or(0)
}

fn roster_of(snapshot: &Snapshot) -> Roster {
    snapshot
        .children()
        .filter(|(key, _)| key.as_str() != paths::USER_COUNT_KEY)
        .filter_map(|(key, value)| {
            value
                .get("name")
                .and_then(Value::as_str)
                .map(|name| (key.clone(), name.to_owned()))
        })
        .collect()
}

/// A ready presence session. Dropping it stops local observation only;
/// the disconnect path owns membership removal, and server-armed deferred
/// actions persist until they fire or are cancelled.
#[derive(Debug)]
pub struct PresenceHandle {
    room_id: String,
    user_id: String,
    owner_id: String,
    roster_rx: watch::Receiver<Roster>,
    count_rx: watch::Receiver<i64>,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Live roster for display.
    pub fn roster(&self) -> watch::Receiver<Roster> {
        self.roster_rx.clone()
    }

    /// The live `userCount`. A new value is published only after the
    /// arming plan derived from it has been applied.
    pub fn user_count(&self) -> watch::Receiver<i64> {
        self.count_rx.clone()
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
