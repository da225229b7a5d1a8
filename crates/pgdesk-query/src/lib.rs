//! PgDesk Query - Statement classification and history
//!
//! SQL text analysis proper is an external concern. This crate carries only
//! the keyword-level classification the executor needs to tell result-set
//! queries from row mutations, plus the in-memory query history.

mod classifier;
mod history;

pub use classifier::{
    KeywordAnalyzer, MutationKind, StatementAnalyzer, StatementKind, split_statements,
    table_name_matches,
};
pub use history::{QueryHistory, QueryHistoryEntry};
