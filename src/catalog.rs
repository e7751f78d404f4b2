//! Catalog query contract
//!
//! The boundary between the collector and whatever executes SQL. A
//! [`CatalogSource`] runs one of a fixed set of read-only catalog queries and
//! hands back rows of named values; the collector never sees SQL or driver
//! types.

pub mod queries;

use crate::error::{malformed, AppResult};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;

/// The fixed set of catalog queries a snapshot can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogQuery {
    Tables,
    Columns,
    TableObjects,
    RowCounts,
    TableSizes,
    IndexSizes,
    TotalSizes,
    Sequences,
}

impl CatalogQuery {
    /// SQL text executed by the PostgreSQL source
    pub fn sql(&self) -> &'static str {
        match self {
            CatalogQuery::Tables => queries::LIST_TABLES,
            CatalogQuery::Columns => queries::LIST_COLUMNS,
            CatalogQuery::TableObjects => queries::TABLE_OBJECTS,
            CatalogQuery::RowCounts => queries::EXACT_ROW_COUNTS,
            CatalogQuery::TableSizes => queries::TABLE_SIZES,
            CatalogQuery::IndexSizes => queries::INDEX_SIZES,
            CatalogQuery::TotalSizes => queries::TOTAL_SIZES,
            CatalogQuery::Sequences => queries::SEQUENCE_VALUES,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CatalogQuery::Tables => "tables",
            CatalogQuery::Columns => "columns",
            CatalogQuery::TableObjects => "table_objects",
            CatalogQuery::RowCounts => "row_counts",
            CatalogQuery::TableSizes => "table_sizes",
            CatalogQuery::IndexSizes => "index_sizes",
            CatalogQuery::TotalSizes => "total_sizes",
            CatalogQuery::Sequences => "sequences",
        }
    }
}

/// A single value read from a catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

/// One catalog row, addressed by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    values: BTreeMap<String, CatalogValue>,
}

impl CatalogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for fakes and tests
    pub fn with(mut self, field: impl Into<String>, value: CatalogValue) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: CatalogValue) {
        self.values.insert(field.into(), value);
    }

    fn field(&self, field: &str) -> AppResult<&CatalogValue> {
        self.values
            .get(field)
            .ok_or_else(|| malformed(format!("catalog row is missing required field '{}'", field)))
    }

    pub fn text(&self, field: &str) -> AppResult<&str> {
        match self.field(field)? {
            CatalogValue::Text(s) => Ok(s),
            other => Err(malformed(format!("field '{}' should be text, got {:?}", field, other))),
        }
    }

    pub fn int(&self, field: &str) -> AppResult<i64> {
        match self.field(field)? {
            CatalogValue::Int(n) => Ok(*n),
            other => Err(malformed(format!("field '{}' should be an integer, got {:?}", field, other))),
        }
    }

    /// Like [`CatalogRow::int`], but a SQL NULL reads as `None`
    pub fn opt_int(&self, field: &str) -> AppResult<Option<i64>> {
        match self.field(field)? {
            CatalogValue::Null => Ok(None),
            _ => self.int(field).map(Some),
        }
    }

    /// Non-negative integer (counts and byte sizes)
    pub fn count(&self, field: &str) -> AppResult<u64> {
        let n = self.int(field)?;
        u64::try_from(n).map_err(|_| malformed(format!("field '{}' is negative ({})", field, n)))
    }

    pub fn bool(&self, field: &str) -> AppResult<bool> {
        match self.field(field)? {
            CatalogValue::Bool(b) => Ok(*b),
            other => Err(malformed(format!("field '{}' should be a boolean, got {:?}", field, other))),
        }
    }

    pub fn opt_text(&self, field: &str) -> AppResult<Option<&str>> {
        match self.field(field)? {
            CatalogValue::Null => Ok(None),
            _ => self.text(field).map(Some),
        }
    }

    /// `schema.name` key built from two text fields
    pub fn qualified(&self, schema_field: &str, name_field: &str) -> AppResult<String> {
        Ok(format!(
            "{}.{}",
            key_part(self.text(schema_field)?),
            key_part(self.text(name_field)?)
        ))
    }
}

/// One segment of a dotted key. Names containing `.` or `"` are
/// double-quoted (inner quotes doubled) so every unquoted dot in a key is a
/// separator.
pub fn key_part(name: &str) -> Cow<'_, str> {
    if name.contains(['.', '"']) {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(name)
    }
}

/// Anything able to execute the fixed catalog queries against one database.
///
/// Implementations must keep connectivity failures (`AppError::Connection`)
/// distinguishable from failures reported by the server for the query
/// itself (`AppError::Query`).
pub trait CatalogSource {
    fn run_catalog_query(
        &self,
        query: CatalogQuery,
    ) -> impl Future<Output = AppResult<Vec<CatalogRow>>>;
}
