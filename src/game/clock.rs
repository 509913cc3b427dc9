//! Fixed-cadence simulation tick
//!
//! Order of one tick (fixed, never reordered):
//!   1. Measure and clamp dt
//!   2. Recycle entities whose Destroyed hold has elapsed
//!   3. Time out silent entities, apply queued leaves
//!   4. Pull latest input and integrate every live entity, in join order
//!   5. Spawn, move and collide projectiles
//!   6. Destroy entities whose health reached zero
//!   7. Emit the snapshot

use std::sync::Arc;

use glam::Vec2;
use tracing::{debug, info, warn};

use crate::config::SimConfig;

use super::combat::{Projectile, ProjectileManager};
use super::entity::{EntityState, EntityStatus};
use super::error::SimError;
use super::input::InputChannel;
use super::registry::EntityRegistry;
use super::snapshot::{DestroyCause, GameEvent, TickSnapshot};
use super::PlayerId;

/// Drives one simulation. Owns the registry and projectiles; shares the
/// input channel with whatever delivers device updates.
///
/// Output depends only on the sequence of `tick` times, membership calls and
/// input reads, never on wall-clock reads of its own.
#[derive(Debug)]
pub struct SimulationClock {
    cfg: SimConfig,
    inputs: Arc<InputChannel>,
    registry: EntityRegistry,
    projectiles: ProjectileManager,
    tick: u64,
    last_tick_time: f64,
}

impl SimulationClock {
    /// Time is measured in seconds from an origin of 0.0
    pub fn new(cfg: SimConfig, inputs: Arc<InputChannel>) -> Self {
        Self {
            registry: EntityRegistry::new(cfg.max_health),
            projectiles: ProjectileManager::new(cfg),
            cfg,
            inputs,
            tick: 0,
            last_tick_time: 0.0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn inputs(&self) -> &Arc<InputChannel> {
        &self.inputs
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn projectiles(&self) -> &[Projectile] {
        self.projectiles.projectiles()
    }

    /// Number of the last completed tick
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn join(&mut self, id: PlayerId, spawn: Vec2) -> Result<&EntityState, SimError> {
        self.registry.join(id, spawn)
    }

    pub fn leave(&mut self, id: &PlayerId) -> Result<(), SimError> {
        self.registry.leave(id)
    }

    /// Drop a leave queued for `id` before the next tick applies it
    pub fn cancel_leave(&mut self, id: &PlayerId) -> bool {
        self.registry.cancel_leave(id)
    }

    /// Advance the simulation to `now` (seconds) and return the tick's snapshot.
    ///
    /// Fails only on a corrupted registry, which should end the session.
    pub fn tick(&mut self, now: f64) -> Result<TickSnapshot, SimError> {
        let tick = self.tick + 1;
        let dt = self.measure_dt(now);
        self.last_tick_time = now;

        let mut events = Vec::new();

        self.registry.begin_tick(tick);

        let timed_out = self
            .registry
            .sweep_inactive(tick, &self.inputs, self.cfg.inactivity_ticks);
        for id in timed_out {
            self.record_destroy(&id, DestroyCause::TimedOut, &mut events);
        }
        for id in self.registry.apply_leaves(tick) {
            self.record_destroy(&id, DestroyCause::Left, &mut events);
        }

        for entity in self.registry.all_mut().iter_mut().filter(|e| e.is_live()) {
            let input = self.inputs.read(&entity.id);
            entity.apply_input(input, dt, &self.cfg);
        }

        let outcome = self.projectiles.advance(tick, dt, self.registry.all_mut());
        if !outcome.retired.is_empty() {
            debug!(tick, retired = outcome.retired.len(), "Projectiles retired");
        }

        let mut killed = Vec::new();
        for entity in self.registry.all_mut() {
            if entity.status == EntityStatus::Active && entity.health <= 0 && entity.destroy(tick) {
                // Last hit on the victim this tick gets the credit
                let by = outcome
                    .hits
                    .iter()
                    .rev()
                    .find(|hit| hit.target == entity.id)
                    .map(|hit| hit.attacker.clone());
                info!(player = %entity.id, tick, "Player destroyed");
                killed.push((entity.id.clone(), entity.instance, by));
            }
        }

        events.extend(outcome.hits.into_iter().map(GameEvent::Hit));
        for (player, instance, by) in killed {
            self.inputs.evict(&player);
            events.push(GameEvent::Destroy {
                player,
                instance,
                cause: DestroyCause::Killed { by },
            });
        }

        self.registry.check_integrity()?;

        self.tick = tick;
        self.inputs.advance_to(tick);

        Ok(TickSnapshot {
            tick,
            dt,
            entities: self.registry.all().to_vec(),
            projectiles: self.projectiles.projectiles().to_vec(),
            events,
        })
    }

    fn measure_dt(&self, now: f64) -> f32 {
        let measured = now - self.last_tick_time;
        if !measured.is_finite() || measured < 0.0 {
            warn!(now, last = self.last_tick_time, "Clock went backwards, simulating zero dt");
            return 0.0;
        }
        let max = self.cfg.max_dt;
        if measured > f64::from(max) {
            let err = SimError::ClockStall { measured, max };
            warn!(tick = self.tick + 1, error = %err, "Clamping dt");
            return max;
        }
        measured as f32
    }

    fn record_destroy(&self, id: &PlayerId, cause: DestroyCause, events: &mut Vec<GameEvent>) {
        self.inputs.evict(id);
        if let Some(entity) = self.registry.get(id) {
            events.push(GameEvent::Destroy {
                player: id.clone(),
                instance: entity.instance,
                cause,
            });
        }
    }
}
