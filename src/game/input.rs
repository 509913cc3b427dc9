//! Pending input store shared between device connections and the tick

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::SimError;
use super::PlayerId;

/// Latest merged input state from one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InputSnapshot {
    pub moving_active: bool,
    pub shooting_active: bool,
    /// Direction of travel while moving (radians, `[0, 2π)`)
    pub move_angle: f32,
    pub body_heading: f32,
    pub turret_heading: f32,
    /// Tick after which the last update was received
    pub timestamp: u64,
}

impl InputSnapshot {
    fn idle(timestamp: u64) -> Self {
        Self {
            moving_active: false,
            shooting_active: false,
            move_angle: 0.0,
            body_heading: 0.0,
            turret_heading: 0.0,
            timestamp,
        }
    }
}

/// A partial field set as delivered by the transport; absent fields keep
/// their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PartialInput {
    pub moving: Option<bool>,
    pub shooting: Option<bool>,
    pub move_angle: Option<f32>,
    pub body_heading: Option<f32>,
    pub turret_heading: Option<f32>,
}

/// Normalize an angle into `[0, 2π)`. Non-finite angles are rejected.
pub fn normalize_angle(angle: f32) -> Option<f32> {
    if !angle.is_finite() {
        return None;
    }
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    Some(if wrapped >= TAU { 0.0 } else { wrapped })
}

/// Last-write-wins store of pending input, one slot per device.
///
/// Writers are device connections running on arbitrary tasks; the only reader
/// is the simulation tick. Writes to different devices never contend on the
/// same slot.
#[derive(Debug, Default)]
pub struct InputChannel {
    pending: DashMap<PlayerId, InputSnapshot>,
    /// Last completed tick, used to stamp incoming updates
    current_tick: AtomicU64,
}

impl InputChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update into the pending snapshot for `player`,
    /// creating the slot on first contact.
    pub fn update(&self, player: &PlayerId, partial: PartialInput) {
        let stamp = self.current_tick.load(Ordering::Acquire);
        let mut slot = self
            .pending
            .entry(player.clone())
            .or_insert_with(|| InputSnapshot::idle(stamp));
        let snapshot = slot.value_mut();

        if let Some(moving) = partial.moving {
            snapshot.moving_active = moving;
        }
        if let Some(shooting) = partial.shooting {
            snapshot.shooting_active = shooting;
        }
        merge_angle(player, "move_angle", partial.move_angle, &mut snapshot.move_angle);
        merge_angle(player, "body_heading", partial.body_heading, &mut snapshot.body_heading);
        merge_angle(
            player,
            "turret_heading",
            partial.turret_heading,
            &mut snapshot.turret_heading,
        );

        // A rejected field is still a sign of life from the device
        snapshot.timestamp = stamp;
    }

    /// Latest pending snapshot, or `None` if the device never sent data or was evicted
    pub fn read(&self, player: &PlayerId) -> Option<InputSnapshot> {
        self.pending.get(player).map(|slot| *slot.value())
    }

    /// Drop pending state for `player`. Idempotent.
    pub fn evict(&self, player: &PlayerId) {
        self.pending.remove(player);
    }

    /// Record that `tick` has completed; later updates are stamped with it
    pub fn advance_to(&self, tick: u64) {
        self.current_tick.store(tick, Ordering::Release);
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn merge_angle(player: &PlayerId, field: &'static str, incoming: Option<f32>, target: &mut f32) {
    let Some(raw) = incoming else {
        return;
    };
    match normalize_angle(raw) {
        Some(angle) => *target = angle,
        None => {
            let err = SimError::MalformedInput {
                player: player.clone(),
                field,
            };
            warn!(player = %player, error = %err, "Rejected input field, keeping last valid value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn alice() -> PlayerId {
        PlayerId::from("alice")
    }

    #[test]
    fn read_is_absent_before_first_update() {
        let inputs = InputChannel::new();
        assert!(inputs.read(&alice()).is_none());
        assert!(inputs.is_empty());
    }

    #[test]
    fn later_updates_overwrite_earlier_ones() {
        let inputs = InputChannel::new();
        for i in 0..10 {
            inputs.update(
                &alice(),
                PartialInput {
                    moving: Some(i % 2 == 0),
                    move_angle: Some(i as f32 * 0.1),
                    ..Default::default()
                },
            );
        }

        let snapshot = inputs.read(&alice()).unwrap();
        assert!(!snapshot.moving_active);
        assert!((snapshot.move_angle - 0.9).abs() < 1e-6);
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn partial_updates_merge_field_by_field() {
        let inputs = InputChannel::new();
        inputs.update(
            &alice(),
            PartialInput {
                shooting: Some(true),
                turret_heading: Some(1.0),
                ..Default::default()
            },
        );
        inputs.update(
            &alice(),
            PartialInput {
                moving: Some(true),
                ..Default::default()
            },
        );

        let snapshot = inputs.read(&alice()).unwrap();
        assert!(snapshot.moving_active);
        assert!(snapshot.shooting_active);
        assert_eq!(snapshot.turret_heading, 1.0);
    }

    #[test]
    fn out_of_range_angles_wrap_modulo_tau() {
        let inputs = InputChannel::new();
        inputs.update(
            &alice(),
            PartialInput {
                body_heading: Some(-PI / 2.0),
                turret_heading: Some(5.0 * PI),
                ..Default::default()
            },
        );

        let snapshot = inputs.read(&alice()).unwrap();
        assert!((snapshot.body_heading - 1.5 * PI).abs() < 1e-5);
        assert!((snapshot.turret_heading - PI).abs() < 1e-5);
    }

    #[test]
    fn non_finite_angle_keeps_last_valid_value() {
        let inputs = InputChannel::new();
        inputs.update(
            &alice(),
            PartialInput {
                move_angle: Some(1.25),
                ..Default::default()
            },
        );
        inputs.update(
            &alice(),
            PartialInput {
                moving: Some(true),
                move_angle: Some(f32::NAN),
                body_heading: Some(f32::INFINITY),
                ..Default::default()
            },
        );

        let snapshot = inputs.read(&alice()).unwrap();
        assert_eq!(snapshot.move_angle, 1.25);
        assert_eq!(snapshot.body_heading, 0.0);
        assert!(snapshot.moving_active);
    }

    #[test]
    fn updates_are_stamped_with_last_completed_tick() {
        let inputs = InputChannel::new();
        inputs.advance_to(7);
        inputs.update(&alice(), PartialInput::default());
        assert_eq!(inputs.read(&alice()).unwrap().timestamp, 7);
    }

    #[test]
    fn evict_is_idempotent() {
        let inputs = InputChannel::new();
        inputs.update(&alice(), PartialInput::default());
        inputs.evict(&alice());
        inputs.evict(&alice());
        assert!(inputs.read(&alice()).is_none());
    }
}
