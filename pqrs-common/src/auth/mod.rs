//! Credential checks used by the maintenance surfaces
//!
//! Pure functions only; HTTP extraction lives in `pqrs-api`.

pub mod password;
pub mod secret;

pub use password::{hash_password, verify_password};
pub use secret::{check_optional_token, check_shared_secret, secrets_match, SecretError};
