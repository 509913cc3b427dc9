//! Application state shared across routes

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::game::SessionRegistry;
use crate::util::rate_limit::ConnectLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub connect_limiter: ConnectLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize session registry
        let sessions = Arc::new(SessionRegistry::new(
            config.sim,
            Duration::from_secs(config.session_idle_secs),
        ));

        let connect_limiter = ConnectLimiter::new(config.connect_rate_limit);

        Self {
            config,
            sessions,
            connect_limiter,
        }
    }
}
