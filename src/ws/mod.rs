//! WebSocket transport for devices and screens

pub mod handler;
pub mod protocol;
