//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig, ...)
//! - types/gateway.rs: Supervised gateway settings and fixed ports
//! - types/supervisor.rs: Process supervisor transport and timeouts
//! - types/proxy.rs: Proxy limits
//! - io.rs: Layered configuration loading
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
pub(crate) mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, LogConfig, ServerConfig, WatcherConfig};

pub use types::gateway::{GatewaySettings, GATEWAY_CONTROL_PORT, GATEWAY_PORT};
pub use types::proxy::ProxyConfig;
pub use types::supervisor::SupervisorConfig;

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path};
pub use paths::{config_dir, config_path, ensure_dir, gateway_home, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
