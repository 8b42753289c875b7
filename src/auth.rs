//! Operator authentication gate
//!
//! Scanning is only permitted once the gate reports an authorized operator.
//! The session trusts the gate and performs no authorization of its own.

use crate::error::{Error, Result};
use std::sync::RwLock;

/// Answer from an [`AuthGate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Whether scanning may proceed
    pub authorized: bool,
    /// Identity of the signed-in operator, empty when unauthorized
    pub operator: String,
}

impl Authorization {
    /// Not signed in
    pub fn denied() -> Self {
        Self {
            authorized: false,
            operator: String::new(),
        }
    }
}

/// Supplies the authorized flag and operator identity
pub trait AuthGate: Send + Sync {
    /// Current authorization
    fn authorization(&self) -> Authorization;
}

/// Always authorizes a fixed operator, for deployments where login happens upstream
#[derive(Debug, Clone)]
pub struct StaticGate {
    operator: String,
}

impl StaticGate {
    /// Authorize `operator`
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }
}

impl AuthGate for StaticGate {
    fn authorization(&self) -> Authorization {
        Authorization {
            authorized: true,
            operator: self.operator.clone(),
        }
    }
}

/// Gate opened by signing in with a configured shared secret
pub struct SharedSecretGate {
    secret: Option<String>,
    operator: RwLock<Option<String>>,
}

impl SharedSecretGate {
    /// Gate checking passwords against `secret`. With no secret every sign-in fails.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            operator: RwLock::new(None),
        }
    }

    /// Sign an operator in
    pub fn sign_in(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let (username, email) = (username.trim(), email.trim());
        if username.is_empty() || email.is_empty() {
            return Err(Error::Unauthorized(
                "Please enter your username and email.".to_string(),
            ));
        }

        let secret = self.secret.as_deref().ok_or_else(|| {
            Error::Unauthorized("No operator secret is configured".to_string())
        })?;
        if password != secret {
            tracing::warn!(username, "Rejected operator sign-in");
            return Err(Error::Unauthorized("Incorrect password.".to_string()));
        }

        let identity = format!("{username} <{email}>");
        tracing::info!(operator = %identity, "Operator signed in");
        *self.write() = Some(identity);
        Ok(())
    }

    /// Revoke the current sign-in
    pub fn sign_out(&self) {
        *self.write() = None;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<String>> {
        self.operator
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuthGate for SharedSecretGate {
    fn authorization(&self) -> Authorization {
        let guard = self
            .operator
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(operator) => Authorization {
                authorized: true,
                operator: operator.clone(),
            },
            None => Authorization::denied(),
        }
    }
}
