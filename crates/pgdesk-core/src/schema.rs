//! Schema metadata types

use serde::{Deserialize, Serialize};

/// Database information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub owner: Option<String>,
}

impl DatabaseInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
        }
    }
}

/// Table information as listed by the database service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub row_count: Option<i64>,
}

impl TableInfo {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            row_count: None,
        }
    }

    pub fn id(&self) -> TableId {
        TableId::new(&self.schema, &self.name)
    }
}

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            default_value: None,
        }
    }
}

/// Schema-qualified table identity.
///
/// Two tables are the same table iff schema and name are equal. This is the key
/// used for cache reuse and for the metadata cache (`"schema.table"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub schema: String,
    pub name: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Key used by the metadata cache
    pub fn cache_key(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// The table currently selected in the sidebar.
///
/// `primary_key_columns` and `column_info` are filled lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSelection {
    pub schema: String,
    pub name: String,
    pub primary_key_columns: Option<Vec<String>>,
    pub column_info: Option<Vec<ColumnInfo>>,
}

impl TableSelection {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            primary_key_columns: None,
            column_info: None,
        }
    }

    pub fn with_primary_keys(mut self, columns: Vec<String>) -> Self {
        self.primary_key_columns = Some(columns);
        self
    }

    pub fn id(&self) -> TableId {
        TableId::new(&self.schema, &self.name)
    }
}

impl From<&TableInfo> for TableSelection {
    fn from(info: &TableInfo) -> Self {
        TableSelection::new(&info.schema, &info.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_identity_is_schema_and_name() {
        let a = TableSelection::new("public", "users").with_primary_keys(vec!["id".into()]);
        let b = TableSelection::new("public", "users");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), TableId::new("audit", "users"));
        assert_eq!(a.id().cache_key(), "public.users");
    }
}
