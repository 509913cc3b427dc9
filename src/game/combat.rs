//! Combat system - projectile spawning, flight and hit detection

use glam::Vec2;
use serde::Serialize;

use crate::config::SimConfig;

use super::entity::EntityState;
use super::physics::PhysicsSystem;
use super::PlayerId;

/// Short-lived projectile; travels in a straight line once fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projectile {
    pub id: u64,
    pub owner_id: PlayerId,
    pub position: Vec2,
    /// Captured from the turret at spawn time
    pub heading: f32,
    pub spawn_tick: u64,
    pub ttl_ticks: u64,
}

impl Projectile {
    pub fn is_expired(&self, tick: u64) -> bool {
        tick >= self.spawn_tick + self.ttl_ticks
    }
}

/// Why a projectile left play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    Expired,
    Hit,
    OutOfBounds,
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitResult {
    pub projectile_id: u64,
    pub attacker: PlayerId,
    pub target: PlayerId,
    pub damage: i32,
    pub position: Vec2,
    /// Target health after the hit
    pub remaining_health: i32,
}

/// Everything one `advance` call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceOutcome {
    pub spawned: Vec<u64>,
    pub retired: Vec<(u64, RetireReason)>,
    pub hits: Vec<HitResult>,
}

/// Owns the in-flight projectiles of one simulation
#[derive(Debug)]
pub struct ProjectileManager {
    projectiles: Vec<Projectile>,
    next_id: u64,
    cfg: SimConfig,
}

impl ProjectileManager {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            projectiles: Vec::new(),
            next_id: 1,
            cfg,
        }
    }

    /// Projectiles in spawn order
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Spawn, move and collide projectiles for one tick.
    ///
    /// Hit tests are discrete: a projectile's post-move position is checked
    /// against every active entity except its owner. When several overlap,
    /// the one nearest the projectile's start-of-tick position wins (earlier
    /// join order breaks exact ties). A projectile registers at most one hit.
    pub fn advance(&mut self, tick: u64, dt: f32, entities: &mut [EntityState]) -> AdvanceOutcome {
        let mut outcome = AdvanceOutcome::default();

        // Process shooting
        for entity in entities.iter_mut() {
            if !entity.is_hittable() {
                continue;
            }

            entity.fire_cooldown = (entity.fire_cooldown - dt).max(0.0);
            if entity.shooting && entity.fire_cooldown <= 0.0 {
                let projectile = Projectile {
                    id: self.next_id,
                    owner_id: entity.id.clone(),
                    position: entity.muzzle(self.cfg.muzzle_offset),
                    heading: entity.turret_heading,
                    spawn_tick: tick,
                    ttl_ticks: self.cfg.projectile_ttl_ticks,
                };
                self.next_id += 1;
                outcome.spawned.push(projectile.id);
                self.projectiles.push(projectile);
                entity.fire_cooldown = self.cfg.fire_cooldown;
            }
        }

        // Move projectiles and resolve hits
        let cfg = self.cfg;
        for projectile in &mut self.projectiles {
            if projectile.is_expired(tick) {
                outcome.retired.push((projectile.id, RetireReason::Expired));
                continue;
            }

            let start = projectile.position;
            let velocity = PhysicsSystem::heading_vector(projectile.heading) * cfg.projectile_speed;
            projectile.position = PhysicsSystem::integrate(start, velocity, dt);

            if !PhysicsSystem::in_arena(projectile.position, cfg.arena_width, cfg.arena_height) {
                outcome.retired.push((projectile.id, RetireReason::OutOfBounds));
                continue;
            }

            let Some(target_idx) = nearest_target(projectile, start, entities, &cfg) else {
                continue;
            };

            let target = &mut entities[target_idx];
            target.health = (target.health - cfg.projectile_damage).max(0);
            outcome.hits.push(HitResult {
                projectile_id: projectile.id,
                attacker: projectile.owner_id.clone(),
                target: target.id.clone(),
                damage: cfg.projectile_damage,
                position: projectile.position,
                remaining_health: target.health,
            });
            outcome.retired.push((projectile.id, RetireReason::Hit));
        }

        if !outcome.retired.is_empty() {
            let retired = &outcome.retired;
            self.projectiles
                .retain(|p| !retired.iter().any(|(id, _)| *id == p.id));
        }

        outcome
    }
}

fn nearest_target(
    projectile: &Projectile,
    start: Vec2,
    entities: &[EntityState],
    cfg: &SimConfig,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, entity) in entities.iter().enumerate() {
        if !entity.is_hittable() || entity.id == projectile.owner_id {
            continue;
        }
        if !PhysicsSystem::circles_overlap(
            projectile.position,
            cfg.projectile_radius,
            entity.position,
            cfg.entity_radius,
        ) {
            continue;
        }
        let distance = start.distance_squared(entity.position);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((idx, distance));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityStatus;

    fn cfg() -> SimConfig {
        SimConfig {
            muzzle_offset: 0.0,
            entity_radius: 10.0,
            projectile_radius: 2.0,
            projectile_speed: 100.0,
            projectile_ttl_ticks: 3,
            fire_cooldown: 0.5,
            ..SimConfig::with_tick_rate(10)
        }
    }

    fn active(name: &str, x: f32, y: f32) -> EntityState {
        let mut e = EntityState::new(PlayerId::from(name), 0, Vec2::new(x, y), 100, 0);
        e.status = EntityStatus::Active;
        e
    }

    #[test]
    fn cooldown_limits_fire_rate() {
        let mut manager = ProjectileManager::new(cfg());
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        shooter.turret_heading = std::f32::consts::FRAC_PI_2;
        let mut entities = vec![shooter];

        let mut spawned = 0;
        for tick in 1..=4 {
            spawned += manager.advance(tick, 0.125, &mut entities).spawned.len();
        }
        // Fires on tick 1, then once the 0.5s cooldown has drained on tick 5
        assert_eq!(spawned, 1);
        spawned += manager.advance(5, 0.125, &mut entities).spawned.len();
        assert_eq!(spawned, 2);
    }

    #[test]
    fn projectiles_expire_after_ttl() {
        let mut manager = ProjectileManager::new(cfg());
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        let mut entities = vec![shooter];

        manager.advance(1, 0.1, &mut entities);
        entities[0].shooting = false;
        manager.advance(2, 0.1, &mut entities);
        manager.advance(3, 0.1, &mut entities);
        assert_eq!(manager.projectiles().len(), 1);

        let outcome = manager.advance(4, 0.1, &mut entities);
        assert_eq!(outcome.retired, vec![(1, RetireReason::Expired)]);
        assert!(manager.projectiles().is_empty());
    }

    #[test]
    fn owner_is_never_hit() {
        let mut manager = ProjectileManager::new(cfg());
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        let mut entities = vec![shooter];

        let outcome = manager.advance(1, 0.01, &mut entities);
        assert!(outcome.hits.is_empty());
        assert_eq!(entities[0].health, 100);
    }

    #[test]
    fn nearest_entity_to_start_position_wins() {
        let mut manager = ProjectileManager::new(cfg());
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        // Both overlap the projectile after its first step to x = 10
        let far = active("far", 18.0, 0.0);
        let near = active("near", 8.0, 3.0);
        let mut entities = vec![shooter, far, near];

        let outcome = manager.advance(1, 0.1, &mut entities);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].target, PlayerId::from("near"));
        assert_eq!(entities[1].health, 100);
        assert_eq!(entities[2].health, 80);
    }

    #[test]
    fn heading_is_fixed_at_spawn() {
        let mut manager = ProjectileManager::new(SimConfig {
            projectile_ttl_ticks: 10,
            ..cfg()
        });
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        shooter.turret_heading = 0.0;
        let mut entities = vec![shooter];

        manager.advance(1, 0.1, &mut entities);
        entities[0].shooting = false;
        entities[0].turret_heading = std::f32::consts::FRAC_PI_2;

        for tick in 2..=5 {
            manager.advance(tick, 0.1, &mut entities);
        }
        let projectile = &manager.projectiles()[0];
        assert_eq!(projectile.heading, 0.0);
        // Five steps of 10 units along +x
        assert!((projectile.position.x - 50.0).abs() < 1e-4);
        assert!(projectile.position.y.abs() < 1e-4);
    }

    #[test]
    fn leaving_the_arena_retires_projectile() {
        let mut manager = ProjectileManager::new(SimConfig {
            arena_width: 20.0,
            arena_height: 20.0,
            ..cfg()
        });
        let mut shooter = active("bob", 0.0, 0.0);
        shooter.shooting = true;
        let mut entities = vec![shooter];

        let outcome = manager.advance(1, 0.5, &mut entities);
        assert_eq!(outcome.retired, vec![(1, RetireReason::OutOfBounds)]);
    }
}
