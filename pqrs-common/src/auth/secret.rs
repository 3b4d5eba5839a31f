//! Shared-secret comparison
//!
//! Secrets are compared through their SHA-256 digests with a
//! constant-time fold so neither length nor content leaks through timing.

use sha2::{Digest, Sha256};

// ========================================
// Error Types
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretError {
    /// No secret configured; the guarded action is disabled
    NotConfigured,
    /// Request carried no value
    Missing,
    /// Request value does not match
    Mismatch,
}

impl std::fmt::Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::NotConfigured => write!(f, "Secret not configured"),
            SecretError::Missing => write!(f, "Secret missing from request"),
            SecretError::Mismatch => write!(f, "Secret does not match"),
        }
    }
}

impl std::error::Error for SecretError {}

// ========================================
// Comparison
// ========================================

/// Constant-time equality of two secrets
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Mandatory secret: refused when unconfigured, missing or different
pub fn check_shared_secret(provided: Option<&str>, configured: Option<&str>) -> Result<(), SecretError> {
    let expected = configured.filter(|s| !s.is_empty()).ok_or(SecretError::NotConfigured)?;
    let provided = provided.ok_or(SecretError::Missing)?;
    if secrets_match(provided, expected) {
        Ok(())
    } else {
        Err(SecretError::Mismatch)
    }
}

/// Optional secret: anything passes when unconfigured
pub fn check_optional_token(provided: Option<&str>, configured: Option<&str>) -> Result<(), SecretError> {
    match configured.filter(|s| !s.is_empty()) {
        None => Ok(()),
        Some(expected) => check_shared_secret(provided, Some(expected)),
    }
}
