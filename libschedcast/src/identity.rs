//! Bearer credentials for the publish service
//!
//! The publish service authorizes every dispatch with a bearer token that
//! represents the current owner. How that token is obtained (login flow,
//! refresh) is outside this crate; an [`IdentityProvider`] only hands it over.
//! Tokens are wrapped in [`SecretString`] so they are zeroed on drop and never
//! show up in `Debug` output.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{DispatchError, Result};

/// Source of the bearer credential used to authorize dispatches
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current bearer token
    ///
    /// # Errors
    ///
    /// `DispatchError::Authentication` if no usable token is available.
    async fn bearer_token(&self) -> Result<SecretString>;
}

/// A fixed token, e.g. injected by an embedding application
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticToken {
    async fn bearer_token(&self) -> Result<SecretString> {
        let token = self.token.expose_secret();
        if token.trim().is_empty() {
            return Err(DispatchError::Authentication("bearer token is empty".to_string()).into());
        }
        Ok(SecretString::from(token.to_string()))
    }
}

/// Reads the token from an environment variable at dispatch time
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

#[async_trait]
impl IdentityProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Result<SecretString> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(SecretString::from(token)),
            Ok(_) => Err(DispatchError::Authentication(format!(
                "environment variable {} is empty",
                self.var
            ))
            .into()),
            Err(_) => Err(DispatchError::Authentication(format!(
                "environment variable {} is not set; export a publish token to dispatch posts",
                self.var
            ))
            .into()),
        }
    }
}
