//! Simulation error taxonomy

use super::PlayerId;

/// Errors and anomalies raised by the simulation core.
///
/// Only `RegistryCorrupted` is fatal to a session. `MalformedInput` and
/// `ClockStall` are never returned to callers; they are logged where they
/// are detected and the simulation carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("player {0} already has a live entity")]
    AlreadyJoined(PlayerId),

    #[error("no entity registered for player {0}")]
    UnknownIdentity(PlayerId),

    #[error("malformed input from {player}: field `{field}` is not finite")]
    MalformedInput {
        player: PlayerId,
        field: &'static str,
    },

    #[error("clock stall: measured dt {measured:.3}s exceeds clamp {max:.3}s")]
    ClockStall { measured: f64, max: f32 },

    #[error("entity registry corrupted: {0}")]
    RegistryCorrupted(String),
}

impl SimError {
    /// Whether the owning session must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::RegistryCorrupted(_))
    }
}
