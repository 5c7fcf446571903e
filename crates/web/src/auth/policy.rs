//! Password strength policies.

use realmgate_common::{Error, Result};

/// Pluggable check applied to new passwords before they are hashed
pub trait PasswordPolicy: Send + Sync {
    fn check(&self, password: &str) -> Result<()>;
}

/// Minimum/maximum length with no whitespace at either end
#[derive(Debug, Clone)]
pub struct MinLengthPolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for MinLengthPolicy {
    fn default() -> Self {
        Self {
            min_len: 8,
            max_len: 1024,
        }
    }
}

impl PasswordPolicy for MinLengthPolicy {
    fn check(&self, password: &str) -> Result<()> {
        let len = password.chars().count();
        if len < self.min_len {
            return Err(Error::PolicyViolation(format!(
                "password must be at least {} characters",
                self.min_len
            )));
        }
        if len > self.max_len {
            return Err(Error::PolicyViolation(format!(
                "password must be at most {} characters",
                self.max_len
            )));
        }
        if password.trim() != password {
            return Err(Error::PolicyViolation(
                "password must not start or end with whitespace".to_string(),
            ));
        }
        Ok(())
    }
}
