//! End-to-end presence scenarios against the in-process store: joins,
//! forced disconnects, last-member teardown, and listing self-healing.

use serde_json::json;

use watchparty_presence::{
    PresenceController, PresenceError, PresenceHandle, RoomLifecycleGuard, paths,
};
use watchparty_store::RealtimeStore;

const ROOM: &str = "movie-night";

fn setup() -> (RealtimeStore, PresenceController) {
    let store = RealtimeStore::new();
    let controller = PresenceController::new(store.clone());
    controller.directory().create(ROOM, "alice", "Movie Night");
    controller.profiles().put("alice", "Alice");
    controller.profiles().put("bob", "Bob");
    store
        .append_to_log(
            &paths::chat(ROOM),
            json!({ "senderId": "alice", "text": "hi" }),
        )
        .unwrap();
    (store, controller)
}

/// Await until the handle has observed (and therefore armed for) `target`.
async fn wait_for_count(handle: &PresenceHandle, target: i64) {
    let mut rx = handle.user_count();
    while *rx.borrow_and_update() != target {
        rx.changed().await.unwrap();
    }
}

#[tokio::test]
async fn joining_publishes_membership_count_and_join_request() {
    let (store, controller) = setup();
    let conn = store.connect();
    let handle = controller.enter(&conn, ROOM, "alice").unwrap();

    assert_eq!(
        store.get(&paths::member(ROOM, "alice")),
        Some(json!({ "name": "Alice" }))
    );
    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));
    assert_eq!(*handle.user_count().borrow(), 1);
    assert_eq!(
        handle.roster().borrow().get("alice").map(String::as_str),
        Some("Alice")
    );
    assert_eq!(handle.owner_id(), "alice");

    let requests = controller.directory().join_requests(ROOM);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sender_id, "alice");
    assert_eq!(requests[0].kind, "join");
}

#[tokio::test]
async fn unknown_room_is_rejected_before_any_presence_write() {
    let (store, controller) = setup();
    let conn = store.connect();
    let err = controller.enter(&conn, "no-such-room", "alice").unwrap_err();
    assert!(matches!(err, PresenceError::RoomNotFound(_)));
    assert!(store.get(&paths::room("no-such-room")).is_none());
}

#[tokio::test]
async fn missing_display_name_blocks_the_join() {
    let (store, controller) = setup();
    let conn = store.connect();
    let err = controller.enter(&conn, ROOM, "carol").unwrap_err();
    assert!(matches!(err, PresenceError::DisplayNameUnavailable(_)));
    // Nothing half-written: no entry, no count.
    assert!(store.get(&paths::member(ROOM, "carol")).is_none());
    assert!(store.get(&paths::user_count(ROOM)).is_none());
}

#[tokio::test]
async fn last_leaver_takes_room_listing_and_chat_down() {
    let (store, controller) = setup();
    let conn = store.connect();
    let _handle = controller.enter(&conn, ROOM, "alice").unwrap();

    // Simulated crash: no client code runs, the store fires the armed
    // actions itself.
    conn.sever();

    assert!(store.get(&paths::room(ROOM)).is_none());
    assert!(store.get(&paths::listing(ROOM)).is_none());
    assert!(store.get(&paths::chat(ROOM)).is_none());
}

#[tokio::test]
async fn surviving_member_keeps_the_room() {
    let (store, controller) = setup();
    let conn_a = store.connect();
    let a = controller.enter(&conn_a, ROOM, "alice").unwrap();
    let conn_b = store.connect();
    let _b = controller.enter(&conn_b, ROOM, "bob").unwrap();

    // Alice was alone once, so deletion was armed; she must observe the
    // second member (which cancels it) before we cut her off.
    wait_for_count(&a, 2).await;
    conn_a.sever();

    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));
    assert!(store.get(&paths::member(ROOM, "alice")).is_none());
    assert_eq!(
        store.get(&paths::member(ROOM, "bob")),
        Some(json!({ "name": "Bob" }))
    );
    assert!(store.get(&paths::listing(ROOM)).is_some());
    assert!(store.get(&paths::chat(ROOM)).is_some());

    // A second loss detection for the same session fires nothing.
    conn_a.sever();
    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));
}

#[tokio::test]
async fn becoming_last_again_rearms_the_deletion() {
    let (store, controller) = setup();
    let conn_a = store.connect();
    let a = controller.enter(&conn_a, ROOM, "alice").unwrap();
    let conn_b = store.connect();
    let _b = controller.enter(&conn_b, ROOM, "bob").unwrap();

    wait_for_count(&a, 2).await;
    conn_b.sever();
    wait_for_count(&a, 1).await;
    conn_a.sever();

    assert!(store.get(&paths::room(ROOM)).is_none());
    assert!(store.get(&paths::listing(ROOM)).is_none());
    assert!(store.get(&paths::chat(ROOM)).is_none());
}

#[tokio::test]
async fn reentering_while_present_does_not_reincrement() {
    let (store, controller) = setup();
    let conn = store.connect();
    let _first = controller.enter(&conn, ROOM, "alice").unwrap();

    // A duplicate entry run (reconnect, re-mounted UI) finds itself
    // already in the roster and must not count itself twice.
    let _second = controller.enter(&conn, ROOM, "alice").unwrap();
    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));
    assert_eq!(controller.directory().join_requests(ROOM).len(), 1);
}

#[tokio::test]
async fn snapshot_redelivery_leaves_the_count_alone() {
    let (store, controller) = setup();
    let conn = store.connect();
    let handle = controller.enter(&conn, ROOM, "alice").unwrap();

    // Unrelated roster churn forces the watcher to reprocess a snapshot
    // that already contains us.
    store.set(&paths::member(ROOM, "ghost"), json!({ "name": "Ghost" }));
    let mut roster = handle.roster();
    while !roster.borrow_and_update().contains_key("ghost") {
        roster.changed().await.unwrap();
    }

    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));
}

#[tokio::test]
async fn concurrent_joins_are_both_counted() {
    let (store, controller) = setup();
    let conn_a = store.connect();
    let conn_b = store.connect();

    let join_a = {
        let controller = controller.clone();
        let conn = conn_a.clone();
        tokio::spawn(async move { controller.enter(&conn, ROOM, "alice").unwrap() })
    };
    let join_b = {
        let controller = controller.clone();
        let conn = conn_b.clone();
        tokio::spawn(async move { controller.enter(&conn, ROOM, "bob").unwrap() })
    };
    let (a, b) = (join_a.await.unwrap(), join_b.await.unwrap());

    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(2)));
    wait_for_count(&a, 2).await;
    wait_for_count(&b, 2).await;
    let roster = a.roster().borrow().clone();
    assert_eq!(roster.len(), 2);
}

#[tokio::test]
async fn dropping_the_handle_stops_observation_but_not_membership() {
    let (store, controller) = setup();
    let conn = store.connect();
    let handle = controller.enter(&conn, ROOM, "alice").unwrap();

    // Unmount: local listeners go away, the roster entry stays.
    drop(handle);
    assert_eq!(
        store.get(&paths::member(ROOM, "alice")),
        Some(json!({ "name": "Alice" }))
    );
    assert_eq!(store.get(&paths::user_count(ROOM)), Some(json!(1)));

    // The armed disconnect path still owns the cleanup.
    conn.sever();
    assert!(store.get(&paths::room(ROOM)).is_none());
}

#[tokio::test]
async fn discovery_listing_self_heals() {
    let (store, _controller) = setup();
    let _guard = RoomLifecycleGuard::spawn(store.clone(), ROOM);

    store.remove(&paths::listing(ROOM));
    let mut rx = store.watch(&paths::listing(ROOM));
    loop {
        let restored = rx.borrow_and_update().child("name") == Some(&json!("Room Name"));
        if restored {
            break;
        }
        rx.changed().await.unwrap();
    }
}
