//! WebSocket protocol message definitions
//! These are the wire types for device/screen-server communication

use serde::{Deserialize, Serialize};

use crate::game::combat::Projectile;
use crate::game::entity::EntityState;
use crate::game::input::PartialInput;
use crate::game::snapshot::GameEvent;
use crate::game::PlayerId;

/// Messages sent from a gamepad device to the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PadMsg {
    /// Changed input fields; omitted fields keep their previous value
    Input {
        moving: Option<bool>,
        shooting: Option<bool>,
        /// Radians; also the travel direction unless `moveAngle` is sent
        #[serde(rename = "bodyRotation")]
        body_rotation: Option<f32>,
        #[serde(rename = "turretRotation")]
        turret_rotation: Option<f32>,
        #[serde(rename = "moveAngle")]
        move_angle: Option<f32>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl PadMsg {
    /// Input fields as a partial update, if this is an input message
    pub fn to_partial(&self) -> Option<PartialInput> {
        match *self {
            PadMsg::Input {
                moving,
                shooting,
                body_rotation,
                turret_rotation,
                move_angle,
            } => Some(PartialInput {
                moving,
                shooting,
                move_angle: move_angle.or(body_rotation),
                body_heading: body_rotation,
                turret_heading: turret_rotation,
            }),
            PadMsg::Ping { .. } => None,
        }
    }
}

/// Messages sent from server to devices and screens
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent to a device after it connects
    Welcome {
        /// Token to reconnect with the same identity
        player_id: PlayerId,
        room: String,
        server_time: u64,
    },

    /// One rendered tick, sent to screens
    Frame {
        tick: u64,
        entities: Vec<EntityState>,
        projectiles: Vec<Projectile>,
        /// Events since the previous frame
        events: Vec<GameEvent>,
    },

    /// The room's session stopped
    SessionEnded { room: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
