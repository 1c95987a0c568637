//! Update payloads and snapshot views over the store tree.

use std::collections::BTreeMap;

use serde_json::Value;

/// One field of an `update` payload.
///
/// `Increment` is resolved against the value already in the tree, under the
/// tree write lock, so concurrent increments from independent clients are
/// commutative and never lost. A missing or non-numeric prior value counts
/// as zero.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Set(Value),
    Increment(i64),
}

/// Ordered field map for `update`; ordering keeps merges deterministic.
pub type Fields = BTreeMap<String, FieldValue>;

/// Builds a single-field payload, the common case.
pub fn field(key: impl Into<String>, value: FieldValue) -> Fields {
    let mut fields = Fields::new();
    fields.insert(key.into(), value);
    fields
}

/// A point-in-time view of one subtree, as delivered on a watch stream.
///
/// An absent node and an empty object are both "does not exist"; removal
/// prunes empty parents so the two cannot be told apart, matching the
/// backing-store semantics the presence layer was written against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    value: Option<Value>,
}

impl Snapshot {
    pub(crate) fn new(value: Option<Value>) -> Self {
        Self { value }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.child(key).is_some()
    }

    /// Point lookup of a single child by key.
    pub fn child(&self, key: &str) -> Option<&Value> {
        self.value.as_ref()?.get(key)
    }

    /// Iterate object children; empty for scalars and absent nodes.
    pub fn children(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.value
            .as_ref()
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|object| object.iter())
    }
}
