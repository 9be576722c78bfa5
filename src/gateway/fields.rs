//! Field classification table
//!
//! Every compared field of [`GatewayConfig`] is listed here exactly once.
//! A change to any `Critical` field rotates the gateway token; changes
//! limited to `NonCritical` fields keep it.

use super::types::GatewayConfig;

/// A compared configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Provider,
    ApiKey,
    Port,
    ControlPort,
    Model,
    ModelOverride,
    Workspace,
}

/// Whether a change forces token rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    NonCritical,
}

/// The classification table
pub const FIELD_CLASSES: [(ConfigField, Criticality); 7] = [
    (ConfigField::Provider, Criticality::Critical),
    (ConfigField::ApiKey, Criticality::Critical),
    (ConfigField::Port, Criticality::Critical),
    (ConfigField::ControlPort, Criticality::Critical),
    (ConfigField::Model, Criticality::NonCritical),
    (ConfigField::ModelOverride, Criticality::NonCritical),
    (ConfigField::Workspace, Criticality::NonCritical),
];

impl ConfigField {
    pub fn criticality(self) -> Criticality {
        FIELD_CLASSES
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, class)| *class)
            // every field is in the table; unknown is treated as critical
            .unwrap_or(Criticality::Critical)
    }

    pub fn is_critical(self) -> bool {
        self.criticality() == Criticality::Critical
    }

    fn differs(self, old: &GatewayConfig, new: &GatewayConfig) -> bool {
        match self {
            ConfigField::Provider => old.provider != new.provider,
            ConfigField::ApiKey => old.key_fingerprint != new.key_fingerprint,
            ConfigField::Port => old.port != new.port,
            ConfigField::ControlPort => old.control_port != new.control_port,
            ConfigField::Model => old.model != new.model,
            ConfigField::ModelOverride => old.model_override != new.model_override,
            ConfigField::Workspace => old.workspace != new.workspace,
        }
    }
}

/// Fields whose values differ between two documents
pub fn changed_fields(old: &GatewayConfig, new: &GatewayConfig) -> Vec<ConfigField> {
    FIELD_CLASSES
        .iter()
        .map(|(field, _)| *field)
        .filter(|field| field.differs(old, new))
        .collect()
}

/// Whether moving from `old` to `new` requires a fresh token
pub fn requires_rotation(old: &GatewayConfig, new: &GatewayConfig) -> bool {
    changed_fields(old, new).into_iter().any(ConfigField::is_critical)
}
