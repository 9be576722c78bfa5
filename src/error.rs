//! Error types for Clawhost

use thiserror::Error;

/// Result type alias using Clawhost's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Clawhost
#[derive(Error, Debug)]
pub enum Error {
    /// Bad provider/model/key input
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfig(String),

    /// Lifecycle operation attempted from an incompatible state
    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(String),

    /// The secrets file could not be written
    #[error("Failed to write gateway secrets: {0}")]
    SecretWriteFailed(String),

    /// A supervisor call exceeded its deadline
    #[error("Supervisor timed out: {0}")]
    SupervisorTimeout(String),

    /// The supervisor daemon could not be reached
    #[error("Supervisor unreachable: {0}")]
    SupervisorUnreachable(String),

    /// The supervisor does not know the gateway program
    #[error("Unknown supervisor program: {0}")]
    UnknownProgram(String),

    /// Any other supervisor command failure
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// Proxying was requested while the gateway is not running
    #[error("Gateway is not running: {0}")]
    GatewayNotRunning(String),

    /// The gateway could not be dialed although it should be running
    #[error("Gateway upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A proxied frame exceeded the size limit
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// A proxied session saw no traffic for too long
    #[error("Session idle for {0:?}")]
    IdleTimeout(std::time::Duration),

    /// Host configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller has no owner identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code surfaced to API callers
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidTransition(_) => "invalid_transition",
            Error::SecretWriteFailed(_) => "secret_write_failed",
            Error::SupervisorTimeout(_) => "supervisor_timeout",
            Error::SupervisorUnreachable(_) => "supervisor_unreachable",
            Error::UnknownProgram(_) => "unknown_program",
            Error::Supervisor(_) => "supervisor_error",
            Error::GatewayNotRunning(_) => "gateway_not_running",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::MessageTooLarge(_) => "message_too_large",
            Error::IdleTimeout(_) => "idle_timeout",
            Error::Config(_) => "config_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Http(_) => "http_error",
            Error::WebSocket(_) => "websocket_error",
            Error::Json(_) => "json_error",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SupervisorUnreachable(_) | Error::SupervisorTimeout(_)
        )
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::InvalidTransition(_) | Error::Unauthorized(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}
