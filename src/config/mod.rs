//! Configuration module - environment variable parsing and simulation constants

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Highest supported simulation rate; the session interval is whole microseconds
pub const MAX_TICK_RATE: u32 = 1000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (empty = any)
    pub client_origin: String,
    /// Max WebSocket upgrades per second across all clients
    pub connect_rate_limit: u32,
    /// Seconds an empty session lingers before it is reaped
    pub session_idle_secs: u64,
    /// Constants handed to every simulation instance
    pub sim: SimConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let mut sim = SimConfig::default();
        if let Some(rate) = parse_var::<u32>("TICK_RATE")? {
            sim = SimConfig::with_tick_rate(rate);
        }
        if let Some(speed) = parse_var("MOVE_SPEED")? {
            sim.move_speed = speed;
        }
        if let Some(speed) = parse_var("PROJECTILE_SPEED")? {
            sim.projectile_speed = speed;
        }
        if let Some(cooldown) = parse_var("FIRE_COOLDOWN_SECS")? {
            sim.fire_cooldown = cooldown;
        }
        if let Some(damage) = parse_var("PROJECTILE_DAMAGE")? {
            sim.projectile_damage = damage;
        }
        if let Some(health) = parse_var("MAX_HEALTH")? {
            sim.max_health = health;
        }
        if let Some(secs) = parse_var::<f32>("INACTIVITY_TIMEOUT_SECS")? {
            sim.inactivity_ticks = (secs * sim.tick_rate as f32).ceil().max(1.0) as u64;
        }
        sim.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_default(),
            connect_rate_limit: parse_var("CONNECT_RATE_LIMIT")?.unwrap_or(20),
            session_idle_secs: parse_var("SESSION_IDLE_SECS")?.unwrap_or(30),
            sim,
        })
    }
}

/// Read an optional variable, failing only when it is present but unparsable.
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Simulation constants, fixed for the lifetime of one session.
///
/// Distances are world units, speeds are units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Target ticks per second
    pub tick_rate: u32,
    /// Upper bound on a single tick's dt (seconds)
    pub max_dt: f32,
    /// Entity speed while `moving` is held
    pub move_speed: f32,
    /// Entity collision radius
    pub entity_radius: f32,
    /// Distance from entity centre to where projectiles appear
    pub muzzle_offset: f32,
    /// Starting health
    pub max_health: i32,
    pub projectile_speed: f32,
    pub projectile_radius: f32,
    pub projectile_damage: i32,
    /// Projectile lifetime in ticks
    pub projectile_ttl_ticks: u64,
    /// Seconds between shots for one entity
    pub fire_cooldown: f32,
    /// Ticks without an input update before an entity is force-left
    pub inactivity_ticks: u64,
    pub arena_width: f32,
    pub arena_height: f32,
    /// Broadcast a screen frame every N ticks
    pub snapshot_interval: u32,
}

impl SimConfig {
    /// Defaults scaled to a given tick rate (dt clamp, TTL and timeout follow the rate).
    pub fn with_tick_rate(tick_rate: u32) -> Self {
        let rate = tick_rate.max(1);
        Self {
            tick_rate: rate,
            max_dt: 3.0 / rate as f32,
            move_speed: 150.0,
            entity_radius: 24.0,
            muzzle_offset: 28.0,
            max_health: 100,
            projectile_speed: 400.0,
            projectile_radius: 5.0,
            projectile_damage: 20,
            projectile_ttl_ticks: u64::from(rate) * 3 / 2,
            fire_cooldown: 0.25,
            inactivity_ticks: u64::from(rate) * 10,
            arena_width: 1600.0,
            arena_height: 900.0,
            snapshot_interval: 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(ConfigError::OutOfRange("tick_rate"));
        }
        if !(self.max_dt.is_finite() && self.max_dt > 0.0) {
            return Err(ConfigError::OutOfRange("max_dt"));
        }
        if !(self.move_speed.is_finite() && self.move_speed >= 0.0) {
            return Err(ConfigError::OutOfRange("move_speed"));
        }
        if !(self.projectile_speed.is_finite() && self.projectile_speed > 0.0) {
            return Err(ConfigError::OutOfRange("projectile_speed"));
        }
        if !(self.fire_cooldown.is_finite() && self.fire_cooldown >= 0.0) {
            return Err(ConfigError::OutOfRange("fire_cooldown"));
        }
        if self.projectile_damage <= 0 {
            return Err(ConfigError::OutOfRange("projectile_damage"));
        }
        if self.max_health <= 0 {
            return Err(ConfigError::OutOfRange("max_health"));
        }
        if self.inactivity_ticks == 0 {
            return Err(ConfigError::OutOfRange("inactivity_ticks"));
        }
        if self.arena_width <= 0.0 || self.arena_height <= 0.0 {
            return Err(ConfigError::OutOfRange("arena"));
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::OutOfRange("snapshot_interval"));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::with_tick_rate(60)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Simulation constant out of range: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
