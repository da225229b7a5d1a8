//! Primary-key and column metadata
//!
//! Lookups resolve in a fixed order: this cache, then the fields embedded in
//! the selected table, then a live fetch. A fetched value is written here so
//! the next lookup never reaches the database.

use pgdesk_core::{ColumnInfo, TableId, TableSelection};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableMetadata {
    pub primary_keys: Option<Vec<String>>,
    pub columns: Option<Vec<ColumnInfo>>,
}

/// Metadata keyed by `"schema.table"`
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<String, TableMetadata>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &TableId) -> Option<&TableMetadata> {
        self.entries.get(&table.cache_key())
    }

    pub fn primary_keys(&self, table: &TableId) -> Option<&[String]> {
        self.get(table).and_then(|m| m.primary_keys.as_deref())
    }

    pub fn columns(&self, table: &TableId) -> Option<&[ColumnInfo]> {
        self.get(table).and_then(|m| m.columns.as_deref())
    }

    pub fn store_primary_keys(&mut self, table: &TableId, primary_keys: Vec<String>) {
        self.entries.entry(table.cache_key()).or_default().primary_keys = Some(primary_keys);
    }

    pub fn store_columns(&mut self, table: &TableId, columns: Vec<ColumnInfo>) {
        self.entries.entry(table.cache_key()).or_default().columns = Some(columns);
    }

    /// Drop everything known about `table`
    pub fn invalidate(&mut self, table: &TableId) -> bool {
        self.entries.remove(&table.cache_key()).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a metadata lookup was answered from
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSource<T> {
    Cache(T),
    Embedded(T),
    /// Neither source knows; fetch from the database and cache the answer
    Fetch,
}

impl<T> MetadataSource<T> {
    pub fn into_known(self) -> Option<T> {
        match self {
            MetadataSource::Cache(value) | MetadataSource::Embedded(value) => Some(value),
            MetadataSource::Fetch => None,
        }
    }
}

/// Resolve primary-key columns: cache, then embedded, then fetch
pub fn resolve_primary_keys(
    cache: &MetadataCache,
    table: &TableSelection,
) -> MetadataSource<Vec<String>> {
    if let Some(keys) = cache.primary_keys(&table.id()) {
        return MetadataSource::Cache(keys.to_vec());
    }
    match &table.primary_key_columns {
        Some(keys) => MetadataSource::Embedded(keys.clone()),
        None => MetadataSource::Fetch,
    }
}

/// Resolve column info with the same priority as primary keys
pub fn resolve_column_info(
    cache: &MetadataCache,
    table: &TableSelection,
) -> MetadataSource<Vec<ColumnInfo>> {
    if let Some(columns) = cache.columns(&table.id()) {
        return MetadataSource::Cache(columns.to_vec());
    }
    match &table.column_info {
        Some(columns) => MetadataSource::Embedded(columns.clone()),
        None => MetadataSource::Fetch,
    }
}
