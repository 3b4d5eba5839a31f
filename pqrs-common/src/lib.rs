//! # PQRS Common Library
//!
//! Shared code for the PQRS backend services:
//! - Configuration loading
//! - Schema reconciliation (inspection, dialects, migration catalog, runner)
//! - Destructive reset and reseed
//! - Password hashing and shared-secret checks

pub mod auth;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
