//! Operator credential handling.
//!
//! The credential that funds airdrops is supplied at runtime through an
//! environment variable and never written to config files or logs.

use crate::errors::{MachinaError, MachinaResult};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret authorizing the operator signer. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OperatorCredential(String);

impl OperatorCredential {
    pub fn new(secret: impl Into<String>) -> MachinaResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(MachinaError::config("operator credential is empty"));
        }
        Ok(Self(secret))
    }

    /// Read the credential from the environment variable `var`.
    pub fn from_env(var: &str) -> MachinaResult<Self> {
        let secret = std::env::var(var).map_err(|_| {
            MachinaError::config(format!("operator credential variable {var} is not set"))
        })?;
        Self::new(secret)
    }

    /// The secret value, for handing to a signer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OperatorCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OperatorCredential(<redacted>)")
    }
}
