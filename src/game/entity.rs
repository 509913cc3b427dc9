//! Per-player authoritative entity state

use glam::Vec2;
use serde::Serialize;

use crate::config::SimConfig;

use super::input::InputSnapshot;
use super::physics::PhysicsSystem;
use super::PlayerId;

/// Lifecycle of one entity instance. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Created by a join, not yet simulated
    Joining,
    Active,
    /// Held for one extra tick so effects can render
    Destroyed,
    /// Terminal; the slot has been released
    Recycled,
}

/// Authoritative state of one player's entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub id: PlayerId,
    /// Unique per instance; a rejoin always gets a fresh value
    pub instance: u64,
    pub position: Vec2,
    pub velocity: Vec2,
    pub body_heading: f32,
    pub turret_heading: f32,
    pub health: i32,
    pub status: EntityStatus,

    /// Fire intent pulled on the current tick
    #[serde(skip)]
    pub shooting: bool,
    /// Seconds until the next shot is allowed
    #[serde(skip)]
    pub fire_cooldown: f32,
    #[serde(skip)]
    pub joined_tick: u64,
    #[serde(skip)]
    pub destroyed_tick: Option<u64>,
}

impl EntityState {
    pub fn new(id: PlayerId, instance: u64, spawn: Vec2, health: i32, joined_tick: u64) -> Self {
        Self {
            id,
            instance,
            position: spawn,
            velocity: Vec2::ZERO,
            body_heading: 0.0,
            turret_heading: 0.0,
            health,
            status: EntityStatus::Joining,
            shooting: false,
            fire_cooldown: 0.0,
            joined_tick,
            destroyed_tick: None,
        }
    }

    /// Joining or Active: simulated this tick
    pub fn is_live(&self) -> bool {
        matches!(self.status, EntityStatus::Joining | EntityStatus::Active)
    }

    /// Eligible as a projectile target
    pub fn is_hittable(&self) -> bool {
        self.status == EntityStatus::Active && self.health > 0
    }

    /// Pull the latest input and integrate one step.
    ///
    /// Missing input means no movement and no fire; headings keep their
    /// last known values.
    pub fn apply_input(&mut self, input: Option<InputSnapshot>, dt: f32, cfg: &SimConfig) {
        match input {
            Some(input) => {
                self.velocity = PhysicsSystem::intent_velocity(
                    input.moving_active,
                    input.move_angle,
                    cfg.move_speed,
                );
                self.body_heading = input.body_heading;
                self.turret_heading = input.turret_heading;
                self.shooting = input.shooting_active;
            }
            None => {
                self.velocity = Vec2::ZERO;
                self.shooting = false;
            }
        }

        let moved = PhysicsSystem::integrate(self.position, self.velocity, dt);
        self.position = PhysicsSystem::clamp_to_arena(
            moved,
            cfg.entity_radius,
            cfg.arena_width,
            cfg.arena_height,
        );

        if self.status == EntityStatus::Joining {
            self.status = EntityStatus::Active;
        }
    }

    /// Where projectiles leave the turret
    pub fn muzzle(&self, offset: f32) -> Vec2 {
        self.position + PhysicsSystem::heading_vector(self.turret_heading) * offset
    }

    /// Move to Destroyed at `tick`. Returns false if already destroyed or recycled.
    pub fn destroy(&mut self, tick: u64) -> bool {
        if self.status >= EntityStatus::Destroyed {
            return false;
        }
        self.status = EntityStatus::Destroyed;
        self.destroyed_tick = Some(tick);
        self.velocity = Vec2::ZERO;
        self.shooting = false;
        true
    }
}
