//! Pure mutations over the JSON tree. The locked store wraps these; nothing
//! here knows about watchers or sessions.

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::path::StorePath;
use crate::value::{FieldValue, Fields};

/// Read a subtree by value. Empty objects read as absent: removal prunes
/// them, and the two are indistinguishable to watchers.
pub(crate) fn read(root: &Value, path: &StorePath) -> Option<Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.get(segment)?;
    }
    if node.as_object().is_some_and(Map::is_empty) {
        None
    } else {
        Some(node.clone())
    }
}

/// Last-write-wins set; intermediate scalars are replaced by objects.
pub(crate) fn write(root: &mut Value, path: &StorePath, value: Value) {
    let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parent.segments() {
        if !matches!(node, Value::Object(_)) {
            *node = Value::Object(Map::new());
        }
        let Value::Object(object) = node else { return };
        node = object
            .entry(segment.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !matches!(node, Value::Object(_)) {
        *node = Value::Object(Map::new());
    }
    let Value::Object(object) = node else { return };
    object.insert(leaf.to_owned(), value);
}

/// Merge fields into the object at `path`, creating it if absent.
/// `Increment` resolves against the prior field value (missing or
/// non-numeric counts as zero).
pub(crate) fn merge(root: &mut Value, path: &StorePath, fields: &Fields) -> Result<(), StoreError> {
    let object = object_at(root, path)?;
    for (key, field) in fields {
        match field {
            FieldValue::Set(value) => {
                object.insert(key.clone(), value.clone());
            }
            FieldValue::Increment(delta) => {
                let prior = object.get(key).and_then(Value::as_i64).unwrap_or(0);
                object.insert(key.clone(), Value::from(prior + delta));
            }
        }
    }
    Ok(())
}

/// Remove the subtree at `path`, pruning parents left empty.
pub(crate) fn remove(root: &mut Value, path: &StorePath) {
    fn recurse(node: &mut Value, segments: &[String]) {
        let Some(object) = node.as_object_mut() else {
            return;
        };
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        if rest.is_empty() {
            object.remove(head);
        } else if let Some(child) = object.get_mut(head) {
            recurse(child, rest);
            if child.as_object().is_some_and(Map::is_empty) {
                object.remove(head);
            }
        }
    }

    if path.is_root() {
        *root = Value::Object(Map::new());
    } else {
        recurse(root, path.segments());
    }
}

/// Append an entry to the array at `path`, creating the array if absent.
/// Runs under the same lock hold as every other mutation, so there is no
/// read-modify-write race for concurrent appenders.
pub(crate) fn append(root: &mut Value, path: &StorePath, entry: Value) -> Result<(), StoreError> {
    let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
        return Err(StoreError::NotALog { path: path.clone() });
    };
    let object = object_at(root, &parent)?;
    match object.get_mut(leaf) {
        None => {
            object.insert(leaf.to_owned(), Value::Array(vec![entry]));
            Ok(())
        }
        Some(Value::Array(entries)) => {
            entries.push(entry);
            Ok(())
        }
        Some(_) => Err(StoreError::NotALog { path: path.clone() }),
    }
}

/// Navigate to the object at `path`, creating missing intermediates.
/// A scalar anywhere along the way is `NotAnObject`.
fn object_at<'a>(
    root: &'a mut Value,
    path: &StorePath,
) -> Result<&'a mut Map<String, Value>, StoreError> {
    let mut node = root;
    for segment in path.segments() {
        let object = node
            .as_object_mut()
            .ok_or_else(|| StoreError::NotAnObject { path: path.clone() })?;
        node = object
            .entry(segment.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    node.as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject { path: path.clone() })
}
