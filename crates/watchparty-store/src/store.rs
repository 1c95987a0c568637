//! The shared tree store: locked JSON tree plus watcher fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::session::SessionEntry;
use crate::tree;
use crate::value::{FieldValue, Fields, Snapshot, field};

enum WatchTarget {
    Subtree(watch::Sender<Snapshot>),
    Field(watch::Sender<Option<Value>>),
}

struct Watcher {
    path: StorePath,
    target: WatchTarget,
}

impl Watcher {
    fn is_closed(&self) -> bool {
        match &self.target {
            WatchTarget::Subtree(tx) => tx.is_closed(),
            WatchTarget::Field(tx) => tx.is_closed(),
        }
    }
}

pub(crate) struct Inner {
    tree: RwLock<Value>,
    watchers: Mutex<Vec<Watcher>>,
    pub(crate) sessions: Mutex<HashMap<Uuid, SessionEntry>>,
}

/// Handle to the shared store. Cheap to clone; all clones see the same
/// tree, watchers, and sessions.
#[derive(Clone)]
pub struct RealtimeStore {
    pub(crate) inner: Arc<Inner>,
}

impl Default for RealtimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(Value::Object(Map::new())),
                watchers: Mutex::new(Vec::new()),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Read a subtree by value. `None` for absent nodes.
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        tree::read(&self.inner.tree.read(), path)
    }

    /// Last-write-wins set.
    pub fn set(&self, path: &StorePath, value: Value) {
        {
            let mut root = self.inner.tree.write();
            tree::write(&mut root, path, value);
        }
        self.notify(path);
    }

    /// Merge fields into the object at `path`. `FieldValue::Increment`
    /// resolves under the write lock, so concurrent callers never lose an
    /// increment.
    pub fn update(&self, path: &StorePath, fields: &Fields) -> Result<(), StoreError> {
        {
            let mut root = self.inner.tree.write();
            tree::merge(&mut root, path, fields)?;
        }
        self.notify(path);
        Ok(())
    }

    pub fn remove(&self, path: &StorePath) {
        {
            let mut root = self.inner.tree.write();
            tree::remove(&mut root, path);
        }
        self.notify(path);
    }

    /// Append to the array leaf at `path` without a read-modify-write race.
    pub fn append_to_log(&self, path: &StorePath, entry: Value) -> Result<(), StoreError> {
        {
            let mut root = self.inner.tree.write();
            tree::append(&mut root, path, entry)?;
        }
        self.notify(path);
        Ok(())
    }

    /// Commutative counter bump on the integer leaf at `path`.
    pub fn atomic_increment(&self, path: &StorePath) -> Result<(), StoreError> {
        self.add(path, 1)
    }

    pub fn atomic_decrement(&self, path: &StorePath) -> Result<(), StoreError> {
        self.add(path, -1)
    }

    fn add(&self, path: &StorePath, delta: i64) -> Result<(), StoreError> {
        let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
            return Err(StoreError::NotAnObject { path: path.clone() });
        };
        self.update(&parent, &field(leaf, FieldValue::Increment(delta)))
    }

    /// Watch a subtree. The stream is seeded with the current snapshot and
    /// re-emits whenever an overlapping mutation changes the subtree.
    /// Delivery is latest-wins: a slow consumer only ever observes the
    /// newest snapshot, never an unbounded backlog.
    pub fn watch(&self, path: &StorePath) -> watch::Receiver<Snapshot> {
        let (tx, rx) = watch::channel(Snapshot::new(self.get(path)));
        self.inner.watchers.lock().push(Watcher {
            path: path.clone(),
            target: WatchTarget::Subtree(tx),
        });
        rx
    }

    /// Watch a single scalar leaf, e.g. a room's `userCount`.
    pub fn watch_field(&self, path: &StorePath) -> watch::Receiver<Option<Value>> {
        let (tx, rx) = watch::channel(self.get(path));
        self.inner.watchers.lock().push(Watcher {
            path: path.clone(),
            target: WatchTarget::Field(tx),
        });
        rx
    }

    /// Recompute and publish every watcher whose path overlaps `touched`.
    /// Watchers whose receivers are all gone are dropped here.
    pub(crate) fn notify(&self, touched: &StorePath) {
        let root = self.inner.tree.read();
        let mut watchers = self.inner.watchers.lock();
        watchers.retain(|watcher| !watcher.is_closed());
        for watcher in watchers.iter().filter(|w| w.path.overlaps(touched)) {
            match &watcher.target {
                WatchTarget::Subtree(tx) => {
                    let next = Snapshot::new(tree::read(&root, &watcher.path));
                    tx.send_if_modified(|current| {
                        if *current == next {
                            false
                        } else {
                            *current = next;
                            true
                        }
                    });
                }
                WatchTarget::Field(tx) => {
                    let next = tree::read(&root, &watcher.path);
                    tx.send_if_modified(|current| {
                        if *current == next {
                            false
                        } else {
                            *current = next;
                            true
                        }
                    });
                }
            }
        }
    }
}
