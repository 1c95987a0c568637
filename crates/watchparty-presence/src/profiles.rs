//! User profile store client.

use serde_json::json;

use watchparty_store::RealtimeStore;

use crate::paths;
use crate::records::UserProfile;

#[derive(Clone)]
pub struct UserProfiles {
    store: RealtimeStore,
}

impl UserProfiles {
    pub fn new(store: RealtimeStore) -> Self {
        Self { store }
    }

    /// Display name for a user, if one is stored. Blank names count as
    /// missing; a join must never proceed with one.
    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.store
            .get(&paths::profile(user_id))
            .and_then(|value| serde_json::from_value::<UserProfile>(value).ok())
            .map(|profile| profile.name)
            .filter(|name| !name.is_empty())
    }

    pub fn put(&self, user_id: &str, name: &str) {
        self.store.set(&paths::profile(user_id), json!({ "name": name }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_read_as_missing() {
        let profiles = UserProfiles::new(RealtimeStore::new());
        profiles.put("alice", "Alice");
        profiles.put("ghost", "");
        assert_eq!(profiles.display_name("alice").as_deref(), Some("Alice"));
        assert_eq!(profiles.display_name("ghost"), None);
        assert_eq!(profiles.display_name("nobody"), None);
    }
}
