//! Grove database layer: SurrealDB connection management, repository
//! implementations and an in-memory store.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Read-only repositories plus atomic unit-of-work commits
//!   ([`SurrealStore`], [`InMemoryStore`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod memory;
pub mod repository;
mod schema;
mod store;
pub mod unit_of_work;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use memory::InMemoryStore;
pub use schema::{latest_version, run_migrations};
pub use store::SurrealStore;
