//! Comparison dimensions
//!
//! The closed set of axes along which two databases can be compared, and the
//! registry tying each one to its catalog query and snapshot shape.

use crate::catalog::CatalogQuery;
use crate::error::AppError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which aspect of the two databases is being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    TableName,
    TableCount,
    TableSchema,
    RowCount,
    TableSize,
    IndexSize,
    TableTotalSize,
    Sequence,
}

/// The structural shape a dimension's snapshot takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Set of qualified names
    Names,
    /// Single scalar count
    Count,
    /// Table -> columns and attached objects
    Tables,
    /// Qualified name -> integer
    Metrics,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::TableName,
        Dimension::TableCount,
        Dimension::TableSchema,
        Dimension::RowCount,
        Dimension::TableSize,
        Dimension::IndexSize,
        Dimension::TableTotalSize,
        Dimension::Sequence,
    ];

    /// Tag as used on the command line and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::TableName => "table_name",
            Dimension::TableCount => "table_count",
            Dimension::TableSchema => "table_schema",
            Dimension::RowCount => "row_count",
            Dimension::TableSize => "table_size",
            Dimension::IndexSize => "index_size",
            Dimension::TableTotalSize => "table_total_size",
            Dimension::Sequence => "sequence",
        }
    }

    /// Catalog queries that feed this dimension, in execution order.
    ///
    /// `table_schema` lists tables first so that a table without any
    /// columns still shows up in the snapshot, then columns, then the
    /// indexes, constraints and triggers attached to each table.
    pub fn queries(&self) -> &'static [CatalogQuery] {
        match self {
            Dimension::TableName | Dimension::TableCount => &[CatalogQuery::Tables],
            Dimension::TableSchema => &[
                CatalogQuery::Tables,
                CatalogQuery::Columns,
                CatalogQuery::TableObjects,
            ],
            Dimension::RowCount => &[CatalogQuery::RowCounts],
            Dimension::TableSize => &[CatalogQuery::TableSizes],
            Dimension::IndexSize => &[CatalogQuery::IndexSizes],
            Dimension::TableTotalSize => &[CatalogQuery::TotalSizes],
            Dimension::Sequence => &[CatalogQuery::Sequences],
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Dimension::TableName => Shape::Names,
            Dimension::TableCount => Shape::Count,
            Dimension::TableSchema => Shape::Tables,
            Dimension::RowCount
            | Dimension::TableSize
            | Dimension::IndexSize
            | Dimension::TableTotalSize
            | Dimension::Sequence => Shape::Metrics,
        }
    }

    /// Whether values are byte counts (rendered with size units)
    pub fn is_size(&self) -> bool {
        matches!(
            self,
            Dimension::TableSize | Dimension::IndexSize | Dimension::TableTotalSize
        )
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim())
            .ok_or_else(|| {
                let valid: Vec<&str> = Dimension::ALL.iter().map(|d| d.as_str()).collect();
                AppError::UnsupportedDimension(format!(
                    "'{}' (expected one of: {})",
                    s,
                    valid.join(", ")
                ))
            })
    }
}
