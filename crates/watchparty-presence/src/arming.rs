//! Disconnect-arming decisions as a pure state machine.
//!
//! Cancellation of deferred actions is all-or-nothing per path, so moving
//! from "I am the last member" back to "others are here" has to cancel
//! the terminal removals and then reinstate the baseline pair that the
//! cancel wiped out. Driving that dance from an enum keeps it testable
//! with no store in sight.
//!
//! The decision is always taken from the freshest observed `userCount`,
//! never a captured copy. It is still a non-transactional read: two
//! simultaneous last members can both arm deletion, and a join can land
//! between the decision and the firing. Known consistency weakness,
//! inherited from deciding "last member" off a possibly-stale counter.

/// What is currently registered against the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmingState {
    /// Nothing registered yet; the client is not an established member.
    #[default]
    NotArmed,
    /// Decrement-and-remove-self is pending.
    ArmedBaseline,
    /// Baseline plus removal of room, listing, and chat log.
    ArmedTerminal,
}

/// Registry operations the controller must perform, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingCommand {
    /// Register: decrement `userCount`, remove own membership entry.
    ArmBaseline,
    /// Register removal of the room, its listing, and its chat log.
    ArmTerminal,
    /// Cancel everything pending on the room, listing, and chat paths —
    /// including the baseline decrement, which shares the room path.
    CancelTerminal,
}

impl ArmingState {
    /// Re-derive the registrations for a freshly observed count.
    /// Re-arming an already-registered action is harmless (the registry
    /// keeps the latest per path and kind), so the command lists lean on
    /// that idempotence.
    #[must_use]
    pub fn step(self, user_count: i64) -> (ArmingState, Vec<ArmingCommand>) {
        if user_count <= 1 {
            (
                ArmingState::ArmedTerminal,
                vec![ArmingCommand::ArmBaseline, ArmingCommand::ArmTerminal],
            )
        } else if self == ArmingState::ArmedTerminal {
            (
                ArmingState::ArmedBaseline,
                vec![ArmingCommand::CancelTerminal, ArmingCommand::ArmBaseline],
            )
        } else {
            (ArmingState::ArmedBaseline, vec![ArmingCommand::ArmBaseline])
        }
    }
}
