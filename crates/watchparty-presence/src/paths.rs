//! Store tree layout.
//!
//! Live room state sits under `rooms/`, discovery listings under
//! `available/`, chat logs under `chats/`, durable room documents under
//! `meta/rooms/`, and user profiles under `users/`.

use watchparty_store::StorePath;

/// Reserved key on a room node; everything else under `rooms/{id}` is a
/// member entry.
pub const USER_COUNT_KEY: &str = "userCount";

pub fn room(room_id: &str) -> StorePath {
    StorePath::parse("rooms").child(room_id)
}

pub fn member(room_id: &str, user_id: &str) -> StorePath {
    room(room_id).child(user_id)
}

pub fn user_count(room_id: &str) -> StorePath {
    room(room_id).child(USER_COUNT_KEY)
}

pub fn available() -> StorePath {
    StorePath::parse("available")
}

pub fn listing(room_id: &str) -> StorePath {
    available().child(room_id)
}

pub fn chat(room_id: &str) -> StorePath {
    StorePath::parse("chats").child(room_id)
}

pub fn room_doc(room_id: &str) -> StorePath {
    StorePath::parse("meta/rooms").child(room_id)
}

pub fn join_requests(room_id: &str) -> StorePath {
    room_doc(room_id).child("requests")
}

pub fn profile(user_id: &str) -> StorePath {
    StorePath::parse("users").child(user_id)
}
