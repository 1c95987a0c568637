use thiserror::Error;

use watchparty_store::StoreError;

#[derive(Error, Debug)]
pub enum PresenceError {
    /// The room id is not in the directory; callers redirect, this is not
    /// fatal.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// A join must never write a blank membership entry, so a missing
    /// display name aborts it.
    #[error("no display name stored for user {0}")]
    DisplayNameUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
