//! Identity for the current client.
//!
//! Yields a stable user id, creating an anonymous identity with a
//! generated display name when the client has none yet.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use uuid::Uuid;

use crate::profiles::UserProfiles;

const ADJECTIVES: [&str; 12] = [
    "Brave", "Calm", "Dapper", "Eager", "Fuzzy", "Gentle", "Jolly", "Mellow", "Nimble", "Quiet",
    "Swift", "Witty",
];

const ANIMALS: [&str; 12] = [
    "Badger", "Crane", "Dolphin", "Falcon", "Gecko", "Heron", "Lynx", "Marmot", "Otter", "Panda",
    "Raven", "Tapir",
];

#[derive(Clone)]
pub struct IdentityProvider {
    profiles: UserProfiles,
    current: Arc<Mutex<Option<String>>>,
}

impl IdentityProvider {
    pub fn new(profiles: UserProfiles) -> Self {
        Self {
            profiles,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Adopt an identity established elsewhere (an authenticated user).
    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.current.lock() = Some(user_id.into());
    }

    /// The stable user id for this client. First use without a signed-in
    /// identity mints an anonymous one and stores its profile.
    pub fn current(&self) -> String {
        let mut current = self.current.lock();
        if let Some(user_id) = current.as_ref() {
            return user_id.clone();
        }
        let user_id = Uuid::new_v4().to_string();
        let name = generate_anon_name();
        self.profiles.put(&user_id, &name);
        tracing::debug!(user_id = %user_id, name = %name, "created anonymous identity");
        *current = Some(user_id.clone());
        user_id
    }
}

fn generate_anon_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.random_range(0..ANIMALS.len())];
    format!("{adjective}{animal}{:02}", rng.random_range(0..100))
}
