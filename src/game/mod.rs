//! Game simulation modules

pub mod clock;
pub mod combat;
pub mod entity;
pub mod error;
pub mod input;
pub mod physics;
pub mod presenter;
pub mod registry;
pub mod session;
pub mod snapshot;

pub use clock::SimulationClock;
pub use combat::{AdvanceOutcome, Projectile, ProjectileManager, RetireReason};
pub use entity::{EntityState, EntityStatus};
pub use error::SimError;
pub use input::{InputChannel, InputSnapshot, PartialInput};
pub use presenter::{BroadcastPresenter, PresentationAdapter, SnapshotStats};
pub use registry::EntityRegistry;
pub use session::{GameSession, SessionCommand, SessionHandle, SessionRegistry};
pub use snapshot::{DestroyCause, GameEvent, TickSnapshot};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of one gamepad session
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
