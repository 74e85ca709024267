//! Database layer
//!
//! EcoLearn keeps all state in SQLite. The pool is created from
//! `DatabaseConfig`, migrations are applied on startup, and each aggregate
//! has a repository trait with a sqlx-backed implementation.
//!
//! # Usage
//!
//! ```ignore
//! use ecolearn::config::DatabaseConfig;
//! use ecolearn::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping};
