//! Owner authentication
//!
//! Session issuance lives elsewhere; this host only checks that a request
//! carries the owner's session token.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Cookie carrying the owner session
pub const SESSION_COOKIE: &str = "session_token";

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub owner_id: String,
}

/// Resolves a request to the instance owner or refuses it
#[async_trait]
pub trait OwnerAuthenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity>;
}

/// Accepts one configured session token
pub struct StaticOwnerAuthenticator {
    token: SecretString,
    owner_id: String,
}

impl StaticOwnerAuthenticator {
    pub fn new(token: SecretString, owner_id: impl Into<String>) -> Self {
        Self {
            token,
            owner_id: owner_id.into(),
        }
    }

    /// `None` when no owner token is configured
    pub fn from_config(config: &ServerConfig) -> Option<Self> {
        config
            .owner_token
            .clone()
            .map(|token| Self::new(token, config.owner_id.clone()))
    }
}

#[async_trait]
impl OwnerAuthenticator for StaticOwnerAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity> {
        let presented = bearer_token(headers)
            .or_else(|| session_cookie(headers))
            .ok_or_else(|| Error::Unauthorized("missing session token".to_string()))?;

        let matches: bool = presented
            .as_bytes()
            .ct_eq(self.token.expose_secret().as_bytes())
            .into();
        if !matches {
            return Err(Error::Unauthorized("invalid session token".to_string()));
        }

        Ok(Identity {
            owner_id: self.owner_id.clone(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}
