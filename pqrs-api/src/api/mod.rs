//! HTTP API handlers for pqrs-api

pub mod auth;
pub mod buildinfo;
pub mod health;
pub mod maintenance;
pub mod migrations;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use maintenance::reset_database;
pub use migrations::{migration_status, run_migrations};
