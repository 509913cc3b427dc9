//! Movement integration and arena geometry

use glam::Vec2;

/// Physics helpers for entity and projectile movement.
///
/// The arena is an origin-centred rectangle; angles are radians measured
/// from the +x axis towards +y.
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Unit vector for a heading
    pub fn heading_vector(angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin())
    }

    /// Velocity implied by a movement intent. No acceleration or smoothing:
    /// releasing the stick stops the entity on the same tick.
    pub fn intent_velocity(moving: bool, move_angle: f32, speed: f32) -> Vec2 {
        if moving {
            Self::heading_vector(move_angle) * speed
        } else {
            Vec2::ZERO
        }
    }

    /// Advance a position by `velocity * dt`
    pub fn integrate(position: Vec2, velocity: Vec2, dt: f32) -> Vec2 {
        position + velocity * dt
    }

    /// Keep a circle of `radius` fully inside the arena
    pub fn clamp_to_arena(position: Vec2, radius: f32, width: f32, height: f32) -> Vec2 {
        let half_x = (width / 2.0 - radius).max(0.0);
        let half_y = (height / 2.0 - radius).max(0.0);
        Vec2::new(
            position.x.clamp(-half_x, half_x),
            position.y.clamp(-half_y, half_y),
        )
    }

    /// Check if a point lies inside the arena
    pub fn in_arena(point: Vec2, width: f32, height: f32) -> bool {
        point.x.abs() <= width / 2.0 && point.y.abs() <= height / 2.0
    }

    /// Check overlap between two circles
    pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
        let combined = radius_a + radius_b;
        a.distance_squared(b) <= combined * combined
    }
}
