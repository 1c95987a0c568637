//! Presence core for watchparty rooms.
//!
//! Keeps this client present in a room's roster while its connection
//! lives, and pre-arms store-side cleanup so the bookkeeping stays
//! correct when the client disconnects without running any code. The
//! last member to drop takes the room, its discovery listing, and its
//! chat log down with it.

pub mod arming;
pub mod controller;
pub mod directory;
pub mod error;
pub mod guard;
pub mod identity;
pub mod paths;
pub mod profiles;
pub mod records;

pub use arming::{ArmingCommand, ArmingState};
pub use controller::{PresenceController, PresenceHandle, Roster};
pub use directory::RoomDirectory;
pub use error::PresenceError;
pub use guard::RoomLifecycleGuard;
pub use identity::IdentityProvider;
pub use profiles::UserProfiles;
pub use records::{JoinRequest, RoomDoc, RoomListing, UserProfile};
