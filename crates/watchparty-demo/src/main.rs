//! Watchparty presence demo.
//!
//! Spins up the in-process store with a lease sweeper, lets two anonymous
//! clients join a room, crashes one, and shows the store settling the
//! bookkeeping on its own.

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchparty_presence::{IdentityProvider, PresenceController, RoomLifecycleGuard, paths};
use watchparty_store::{LeaseConfig, RealtimeStore, run_lease_sweeper};

const ROOM: &str = "movie-night";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = RealtimeStore::new();
    run_lease_sweeper(
        store.clone(),
        LeaseConfig {
            lease_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(100),
        },
    );

    let controller = PresenceController::new(store.clone());
    controller.directory().create(ROOM, "host", "Movie Night");
    let guard = RoomLifecycleGuard::spawn(store.clone(), ROOM);

    let alice = IdentityProvider::new(controller.profiles().clone()).current();
    let bob = IdentityProvider::new(controller.profiles().clone()).current();

    let conn_a = store.connect();
    conn_a.spawn_keepalive(Duration::from_millis(100));
    let _a = controller.enter(&conn_a, ROOM, &alice)?;

    let conn_b = store.connect();
    conn_b.spawn_keepalive(Duration::from_millis(100));
    let b = controller.enter(&conn_b, ROOM, &bob)?;

    let mut count = b.user_count();
    while *count.borrow_and_update() < 2 {
        count.changed().await?;
    }
    tracing::info!(roster = ?b.roster().borrow().clone(), "both clients present");

    // Crash the first client. No client code runs; the armed deferred
    // actions settle the roster and count.
    conn_a.sever();
    while *count.borrow_and_update() != 1 {
        count.changed().await?;
    }
    tracing::info!(
        count = *count.borrow(),
        room_exists = store.get(&paths::room(ROOM)).is_some(),
        "store settled after crash"
    );

    // Stop guarding the listing before the last member leaves, or the
    // self-heal would resurrect it for a room that no longer exists.
    drop(guard);
    conn_b.close();
    tracing::info!(
        room_exists = store.get(&paths::room(ROOM)).is_some(),
        listing_exists = store.get(&paths::listing(ROOM)).is_some(),
        "room torn down by last leaver"
    );

    Ok(())
}
