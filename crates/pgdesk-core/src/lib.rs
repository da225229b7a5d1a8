//! PgDesk Core - Core abstractions for the database client
//!
//! This crate provides the types and traits that all other PgDesk crates
//! depend on. It defines:
//!
//! - `DatabaseService` - Trait for the external database collaborator
//! - `KeychainService` - Trait for credential storage
//! - `QueryContextSnapshot` - The identity triple that gates result commits
//! - Common types like `Value`, `TableRow`, `TableId`, etc.

mod context;
mod error;
mod schema;
mod service;
mod types;

pub use context::*;
pub use error::*;
pub use schema::*;
pub use service::*;
pub use types::*;
