//! Gateway module - what the supervised gateway is launched with
//!
//! ## Architecture
//!
//! ```text
//!   ProviderSelection ──► ConfigBuilder ──► GatewayConfig ──► ConfigStore
//!                              │                   └────────► GatewayFileWriter
//!                              └──────────► GatewaySecrets ─► SecretWriter
//! ```
//!
//! Everything here is driven by the
//! [`GatewayController`](crate::controller::GatewayController); nothing in
//! this module touches process lifecycle.

mod builder;
mod fields;
mod render;
mod secrets;
mod selection;
mod store;
mod types;

pub use builder::{fingerprint, generate_token, resolve_model, BuildOutcome, ConfigBuilder};
pub use fields::{changed_fields, requires_rotation, ConfigField, Criticality, FIELD_CLASSES};
pub use render::GatewayFileWriter;
pub use secrets::SecretWriter;
pub use selection::{Provider, ProviderSelection, MAX_MODEL_LEN, MIN_KEY_LEN};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use types::{GatewayConfig, GatewaySecrets, TOKEN_ENV};
