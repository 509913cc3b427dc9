//! Per-tick snapshot handed to the presentation layer

use serde::Serialize;

use super::combat::{HitResult, Projectile};
use super::entity::EntityState;
use super::PlayerId;

/// Why an entity was destroyed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyCause {
    /// `by` is the attacker of the lethal hit
    Killed { by: Option<PlayerId> },
    Left,
    TimedOut,
}

/// Transient events produced during one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    /// Projectile struck an entity
    Hit(HitResult),

    /// Entity entered Destroyed
    Destroy {
        player: PlayerId,
        instance: u64,
        cause: DestroyCause,
    },
}

/// Immutable output of one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    /// Strictly increasing per simulation
    pub tick: u64,
    /// dt actually simulated (after clamping)
    pub dt: f32,
    /// Entities in join order, including those still Destroyed
    pub entities: Vec<EntityState>,
    pub projectiles: Vec<Projectile>,
    pub events: Vec<GameEvent>,
}

impl TickSnapshot {
    pub fn entity(&self, player: &PlayerId) -> Option<&EntityState> {
        self.entities.iter().find(|e| &e.id == player)
    }

    pub fn hits(&self) -> impl Iterator<Item = &HitResult> {
        self.events.iter().filter_map(|event| match event {
            GameEvent::Hit(hit) => Some(hit),
            _ => None,
        })
    }
}
