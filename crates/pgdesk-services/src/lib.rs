//! PgDesk Services - consistency layer for overlapping database operations
//!
//! Operations routinely outlive the UI state that requested them: a table
//! fetch can return after the user picked another table, a connect after the
//! user switched tabs, a delete after the grid was refreshed. This crate
//! decides, at each commit point, whether a result is still safe to apply.
//!
//! # Architecture
//!
//! ```text
//! UI events
//!     ↓
//! Workspace (single writer, owns WorkspaceState)
//!     ├── tab_switch   generation-gated pipeline
//!     ├── executor     context- and counter-gated fetches
//!     ├── mutation     optimistic delete, version-gated rollback
//!     └── caches       per-tab results, saved-query results, metadata
//!     ↓
//! DatabaseService / KeychainService / TabStore (external collaborators)
//! ```
//!
//! Superseded work resolves to [`Outcome::Stale`] and never surfaces as an
//! error. Genuine failures are returned once as [`ServiceError`] and mirrored
//! into the status text of [`WorkspaceState`].

mod config;
mod error;
mod executor;
mod generation;
pub mod logging;
mod metadata_cache;
mod mutation;
pub mod paths;
mod persistence;
mod results_cache;
mod state;
mod tab_switch;
mod tabs;
mod ticker;
mod workspace;

pub use config::WorkspaceConfig;
pub use error::{Outcome, ServiceError, ServiceResult, truncate_for_status};
pub use executor::is_query_stale;
pub use generation::{Generation, GenerationCounter};
pub use metadata_cache::{
    MetadataCache, MetadataSource, TableMetadata, resolve_column_info, resolve_primary_keys,
};
pub use persistence::{
    JsonTabStore, MemoryTabStore, PersistedWorkspace, SavedQueryRecord, TabRecord, TabStore,
    save_with_retry,
};
pub use results_cache::{SavedQueryResults, SavedQueryResultsCache, should_use_cached_results};
pub use state::{Notification, WorkspaceEvent, WorkspaceState};
pub use tab_switch::TabSwitchPhase;
pub use tabs::{Tab, TabId, TabRegistry};
pub use ticker::ElapsedTicker;
pub use workspace::Workspace;
