//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;
use crate::supervisor::validate_program_name;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_supervisor_config(config, result);
    result = validate_gateway_config(config, result);
    result = validate_server_config(config, result);

    result
}

fn validate_supervisor_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if let Err(e) = validate_program_name(&config.supervisor.program) {
        result = result.with_error(
            ValidationIssue::new("supervisor.program", e.to_string())
                .with_suggestion("Use letters, digits, dashes and underscores only"),
        );
    }

    if config.supervisor.stop_timeout.is_zero() || config.supervisor.start_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "supervisor",
            "Supervisor timeouts must be non-zero",
        ));
    }

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.gateway.port == config.gateway.control_port {
        result = result.with_error(ValidationIssue::new(
            "gateway.control_port",
            "Primary and control ports must differ",
        ));
    }

    if config.proxy.max_message_bytes == 0 {
        result = result.with_error(ValidationIssue::new(
            "proxy.max_message_bytes",
            "Message size limit must be positive",
        ));
    }

    result
}

fn validate_server_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.server.owner_token.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "server.owner_token",
                "No owner token configured. Every control and proxy request will be rejected.",
            )
            .with_suggestion("Set CLAWHOST_OWNER_TOKEN"),
        );
    }

    result
}
