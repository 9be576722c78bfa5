//! # Clawhost
//!
//! Control plane for a single supervised chat-gateway process.
//!
//! ## Features
//!
//! - **Gateway Configuration:** Provider, model and key selection rendered into
//!   the files the gateway reads at startup
//! - **Process Supervision:** Start/stop/restart through an external process
//!   manager with retries and deadlines
//! - **One Lifecycle Owner:** A single controller serializes every transition
//! - **Transparent Proxy:** Owner HTTP and WebSocket traffic bridged to the
//!   gateway's loopback ports with its token injected
//! - **Self Healing:** A watcher restarts the gateway after drift or repaired
//!   corruption

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod proxy;
pub mod server;
pub mod supervisor;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use controller::{GatewayController, GatewayStatus, LifecycleState};
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
