//! Table schema snapshots
//!
//! The validator never connects to a database. Schemas are introspected
//! ahead of time and persisted as YAML snapshots; this module loads
//! them and serves lookups through [`SchemaCatalog`].
//!
//! # Snapshot format
//!
//! ```yaml
//! table: users
//! schema: public
//! columns:
//!   - name: customer_id
//!     data_type: uuid
//!     nullable: false
//!     primary_key: true
//!   - name: name
//!     data_type: text
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable column name → declared type snapshot for one table.
///
/// Column names preserve case and lookups are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name
    pub table_name: String,

    /// Database schema (namespace) the table lives in
    pub schema_name: String,

    /// Column name → declared type
    pub columns: BTreeMap<String, String>,
}

impl TableSchema {
    /// Column names as an owned set; the seed of the runtime-available
    /// set during chain validation.
    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.keys().cloned().collect()
    }

    /// Declared type of a column, if present.
    pub fn column_type(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// Parse a snapshot document into a schema.
    pub fn from_snapshot_yaml(yaml: &str) -> Result<TableSchema> {
        let snapshot: SchemaSnapshot = serde_yaml::from_str(yaml)?;
        Ok(TableSchema {
            table_name: snapshot.table,
            schema_name: snapshot.schema,
            columns: snapshot
                .columns
                .into_iter()
                .map(|c| (c.name, c.data_type))
                .collect(),
        })
    }
}

/// Persisted snapshot document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaSnapshot {
    table: String,
    #[serde(default = "default_schema")]
    schema: String,
    columns: Vec<ColumnDesc>,
}

fn default_schema() -> String {
    "public".to_string()
}

/// One column in a persisted snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDesc {
    /// Column name, case preserved
    pub name: String,

    /// Declared type as reported by introspection
    pub data_type: String,

    /// Whether the column accepts NULL
    #[serde(default)]
    pub nullable: bool,

    /// Whether the column is part of the primary key
    #[serde(default)]
    pub primary_key: bool,
}

/// Supplies table schemas to the validation engine.
///
/// A missing schema is a hard stop for that table: validation cannot
/// proceed without one, so `get` fails rather than degrading.
pub trait SchemaCatalog {
    /// Look up the schema for a table reference.
    fn get(&mut self, table_ref: &str) -> Result<TableSchema>;
}

/// Catalog backed by a directory of `<table>.yaml` snapshot files.
///
/// Loaded schemas are cached in the catalog instance; the cache is
/// owned by the caller and cleared with [`DirectoryCatalog::invalidate`],
/// never shared process-wide.
#[derive(Debug)]
pub struct DirectoryCatalog {
    base: PathBuf,
    cache: HashMap<String, TableSchema>,
}

impl DirectoryCatalog {
    /// Create a catalog over a snapshot directory.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            cache: HashMap::new(),
        }
    }

    /// Drop all cached schemas, forcing reloads on next lookup.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

impl SchemaCatalog for DirectoryCatalog {
    fn get(&mut self, table_ref: &str) -> Result<TableSchema> {
        if let Some(schema) = self.cache.get(table_ref) {
            return Ok(schema.clone());
        }

        let path = self.base.join(format!("{}.yaml", table_ref));
        if !path.exists() {
            return Err(Error::SchemaUnavailable {
                table: table_ref.to_string(),
                message: format!("no snapshot at {}", path.display()),
            });
        }

        let contents = std::fs::read_to_string(&path)?;
        let schema = TableSchema::from_snapshot_yaml(&contents)?;
        self.cache.insert(table_ref.to_string(), schema.clone());
        Ok(schema)
    }
}
