//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Profile models and handle normalization

mod database;
mod models;

pub use database::Database;
pub use models::*;
