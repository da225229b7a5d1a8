//! PgDesk Connection - Connection profiles and credentials
//!
//! This crate handles saved connection profiles, secure credential storage and
//! the retry backoff used by anything that talks to durable storage.

mod backoff;
mod config;
mod manager;
mod storage;

pub use backoff::BackoffStrategy;
pub use config::ConnectionIdentity;
pub use manager::ConnectionManager;
pub use storage::{MemoryKeychain, SecureStorage};
