//! Tank Arena Server - authoritative simulation for phone-gamepad arenas
//!
//! Phones connect as gamepads and publish their stick/button state; a shared
//! screen connects per room and renders the frames the server broadcasts.
//! The simulation core lives in [`game`] and has no I/O of its own.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;

use std::future::Future;

use tokio::net::TcpListener;

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;

/// Serve the HTTP/WebSocket API on `listener` until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState::new(config);
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
