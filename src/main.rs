//! Locator Trainer · CSS / XPath practice backend
//!
//! - Axum HTTP + WebSocket API, one practice session per client
//! - In-process DOM with CSS selector and XPath 1.0 engines
//! - Static front-end fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   TRAINER_CONFIG_PATH : path to TOML config (scene, sessions, messages, hint overrides)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod dom;
mod css;
mod xpath;
mod domain;
mod bank;
mod scene;
mod locator;
mod hint;
mod session;
mod config;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::{spawn_idle_sweeper, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (session store, challenge bank, messages).
  let state = Arc::new(AppState::new());
  let _sweeper = spawn_idle_sweeper(state.clone());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "locator_trainer", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
