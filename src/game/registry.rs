//! Entity registry - membership and lifecycle of player entities

use std::collections::HashSet;

use glam::Vec2;
use tracing::{debug, info};

use super::entity::{EntityState, EntityStatus};
use super::error::SimError;
use super::input::InputChannel;
use super::PlayerId;

/// Ticks a destroyed entity stays visible before it is recycled
pub const DESTROYED_HOLD_TICKS: u64 = 2;

/// Owns every non-recycled entity, in join order.
///
/// Membership changes requested between ticks (`join`, `leave`) only create
/// new entities or queue requests; existing entities are mutated inside a
/// tick.
#[derive(Debug)]
pub struct EntityRegistry {
    entities: Vec<EntityState>,
    pending_leaves: Vec<PlayerId>,
    next_instance: u64,
    /// Most recent tick that began
    tick: u64,
    max_health: i32,
}

impl EntityRegistry {
    pub fn new(max_health: i32) -> Self {
        Self {
            entities: Vec::new(),
            pending_leaves: Vec::new(),
            next_instance: 1,
            tick: 0,
            max_health,
        }
    }

    /// Create a fresh entity for `id` at `spawn`, in Joining status.
    pub fn join(&mut self, id: PlayerId, spawn: Vec2) -> Result<&EntityState, SimError> {
        if self.entities.iter().any(|e| e.id == id) {
            return Err(SimError::AlreadyJoined(id));
        }

        let instance = self.next_instance;
        self.next_instance += 1;

        info!(player = %id, instance, x = spawn.x, y = spawn.y, "Player joined");
        self.entities
            .push(EntityState::new(id, instance, spawn, self.max_health, self.tick));
        Ok(&self.entities[self.entities.len() - 1])
    }

    /// Request that `id` leaves; applied at the next tick boundary.
    /// Idempotent while the entity is leaving or destroyed.
    pub fn leave(&mut self, id: &PlayerId) -> Result<(), SimError> {
        let Some(entity) = self.get(id) else {
            return Err(SimError::UnknownIdentity(id.clone()));
        };
        if !entity.is_live() || self.pending_leaves.contains(id) {
            debug!(player = %id, "Leave already in progress");
            return Ok(());
        }
        self.pending_leaves.push(id.clone());
        Ok(())
    }

    /// Withdraw a queued leave for `id`. Returns whether one was pending.
    pub fn cancel_leave(&mut self, id: &PlayerId) -> bool {
        let before = self.pending_leaves.len();
        self.pending_leaves.retain(|pending| pending != id);
        before != self.pending_leaves.len()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&EntityState> {
        self.entities.iter().find(|e| &e.id == id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.get(id).is_some()
    }

    /// Entities in join order
    pub fn all(&self) -> &[EntityState] {
        &self.entities
    }

    pub(crate) fn all_mut(&mut self) -> &mut [EntityState] {
        &mut self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Start `tick`: recycle entities whose Destroyed hold has elapsed.
    /// Returns the recycled entities.
    pub fn begin_tick(&mut self, tick: u64) -> Vec<EntityState> {
        self.tick = tick;

        let mut recycled = Vec::new();
        let mut kept = Vec::with_capacity(self.entities.len());
        for mut entity in self.entities.drain(..) {
            let expired = entity
                .destroyed_tick
                .is_some_and(|at| at + DESTROYED_HOLD_TICKS <= tick);
            if expired {
                entity.status = EntityStatus::Recycled;
                debug!(player = %entity.id, instance = entity.instance, "Entity recycled");
                recycled.push(entity);
            } else {
                kept.push(entity);
            }
        }
        self.entities = kept;
        recycled
    }

    /// Destroy entities with a pending leave request. Returns the ids destroyed.
    pub fn apply_leaves(&mut self, tick: u64) -> Vec<PlayerId> {
        let requests = std::mem::take(&mut self.pending_leaves);
        let mut left = Vec::new();
        for id in requests {
            if let Some(entity) = self.entities.iter_mut().find(|e| e.id == id) {
                if entity.destroy(tick) {
                    info!(player = %id, tick, "Player left");
                    left.push(id);
                }
            }
        }
        left
    }

    /// Force out live entities that have not sent input for `window` ticks.
    ///
    /// An entity that never sent input counts from its join tick.
    pub fn sweep_inactive(
        &mut self,
        tick: u64,
        inputs: &InputChannel,
        window: u64,
    ) -> Vec<PlayerId> {
        let mut timed_out = Vec::new();
        for entity in self.entities.iter_mut().filter(|e| e.is_live()) {
            let last_seen = inputs
                .read(&entity.id)
                .map_or(entity.joined_tick, |input| input.timestamp.max(entity.joined_tick));
            if tick.saturating_sub(last_seen) >= window && entity.destroy(tick) {
                info!(player = %entity.id, tick, last_seen, "Player timed out");
                self.pending_leaves.retain(|id| id != &entity.id);
                timed_out.push(entity.id.clone());
            }
        }
        timed_out
    }

    /// Verify one slot per identity and no recycled entries.
    pub fn check_integrity(&self) -> Result<(), SimError> {
        let mut seen = HashSet::with_capacity(self.entities.len());
        for entity in &self.entities {
            if !seen.insert(&entity.id) {
                return Err(SimError::RegistryCorrupted(format!(
                    "duplicate slot for player {}",
                    entity.id
                )));
            }
            if entity.status == EntityStatus::Recycled {
                return Err(SimError::RegistryCorrupted(format!(
                    "recycled entity {} still registered",
                    entity.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::PartialInput;

    fn id(name: &str) -> PlayerId {
        PlayerId::from(name)
    }

    #[test]
    fn join_twice_fails_and_leaves_state_unchanged() {
        let mut registry = EntityRegistry::new(100);
        registry.join(id("alice"), Vec2::new(1.0, 2.0)).unwrap();
        let before = registry.all().to_vec();

        let err = registry.join(id("alice"), Vec2::new(50.0, 50.0)).unwrap_err();
        assert_eq!(err, SimError::AlreadyJoined(id("alice")));
        assert_eq!(registry.all(), before.as_slice());
    }

    #[test]
    fn all_preserves_join_order() {
        let mut registry = EntityRegistry::new(100);
        for name in ["carol", "alice", "bob"] {
            registry.join(id(name), Vec2::ZERO).unwrap();
        }
        let order: Vec<&str> = registry.all().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, ["carol", "alice", "bob"]);
    }

    #[test]
    fn leave_unknown_identity_is_reported() {
        let mut registry = EntityRegistry::new(100);
        assert_eq!(
            registry.leave(&id("ghost")),
            Err(SimError::UnknownIdentity(id("ghost")))
        );
    }

    #[test]
    fn leave_drains_through_destroyed_to_recycled() {
        let mut registry = EntityRegistry::new(100);
        registry.join(id("alice"), Vec2::ZERO).unwrap();
        registry.leave(&id("alice")).unwrap();
        registry.leave(&id("alice")).unwrap();

        registry.begin_tick(1);
        assert_eq!(registry.apply_leaves(1), vec![id("alice")]);
        assert_eq!(registry.get(&id("alice")).unwrap().status, EntityStatus::Destroyed);

        assert!(registry.begin_tick(2).is_empty());
        let recycled = registry.begin_tick(3);
        assert_eq!(recycled.len(), 1);
        assert_eq!(recycled[0].status, EntityStatus::Recycled);
        assert!(registry.is_empty());
    }

    #[test]
    fn cancelled_leave_is_not_applied() {
        let mut registry = EntityRegistry::new(100);
        registry.join(id("alice"), Vec2::ZERO).unwrap();
        registry.leave(&id("alice")).unwrap();

        assert!(registry.cancel_leave(&id("alice")));
        assert!(!registry.cancel_leave(&id("alice")));

        registry.begin_tick(1);
        assert!(registry.apply_leaves(1).is_empty());
        assert!(registry.get(&id("alice")).unwrap().is_live());
    }

    #[test]
    fn rejoin_after_recycle_allocates_new_instance() {
        let mut registry = EntityRegistry::new(100);
        let first = registry.join(id("alice"), Vec2::ZERO).unwrap().instance;
        registry.leave(&id("alice")).unwrap();
        registry.begin_tick(1);
        registry.apply_leaves(1);

        assert!(registry.join(id("alice"), Vec2::ZERO).is_err());

        registry.begin_tick(3);
        let second = registry.join(id("alice"), Vec2::ZERO).unwrap();
        assert_ne!(second.instance, first);
        assert_eq!(second.status, EntityStatus::Joining);
        assert_eq!(second.health, 100);
    }

    #[test]
    fn sweep_times_out_silent_entities_only() {
        let inputs = InputChannel::new();
        let mut registry = EntityRegistry::new(100);
        registry.join(id("silent"), Vec2::ZERO).unwrap();
        registry.join(id("chatty"), Vec2::ZERO).unwrap();

        for tick in 1..=4 {
            registry.begin_tick(tick);
            inputs.update(&id("chatty"), PartialInput::default());
            assert!(registry.sweep_inactive(tick, &inputs, 5).is_empty());
            inputs.advance_to(tick);
        }

        registry.begin_tick(5);
        assert_eq!(registry.sweep_inactive(5, &inputs, 5), vec![id("silent")]);
        assert!(registry.get(&id("chatty")).unwrap().is_live());
    }

    #[test]
    fn integrity_check_passes_for_normal_registry() {
        let mut registry = EntityRegistry::new(100);
        registry.join(id("alice"), Vec2::ZERO).unwrap();
        registry.join(id("bob"), Vec2::ZERO).unwrap();
        assert!(registry.check_integrity().is_ok());
    }
}
