//! Snapshot Module
//!
//! Point-in-time captures of one database along one dimension, and the
//! machinery around them:
//! - Snapshot data model (this file)
//! - Metric collector (catalog rows -> snapshot)
//! - Diff engine (two snapshots -> ordered report)

pub mod collector;
pub mod diff;

pub use collector::MetricCollector;
pub use diff::{DiffEngine, DiffKind, DiffRecord, DiffReport};

use crate::dimension::{Dimension, Shape};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// One column of a table, as seen by `table_schema`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub ordinal_position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Only set when it differs from the type's default collation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

impl ColumnDescriptor {
    /// Comparable attributes, in a fixed order.
    ///
    /// The name is the column's identity and is not listed. New catalog
    /// attributes only need a line here to take part in diffing.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("dataType", json!(self.data_type)),
            ("nullable", json!(self.nullable)),
            ("ordinalPosition", json!(self.ordinal_position)),
            ("defaultValue", json!(self.default_value)),
            ("collation", json!(self.collation)),
        ]
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), json!(self.name));
        for (field, value) in self.fields() {
            map.insert(field.to_string(), value);
        }
        Value::Object(map)
    }
}

/// Kinds of named objects attached to a table besides its columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSection {
    Indexes,
    Checks,
    ForeignKeys,
    ReferencedBy,
    Triggers,
}

impl TableSection {
    pub const ALL: [TableSection; 5] = [
        TableSection::Indexes,
        TableSection::Checks,
        TableSection::ForeignKeys,
        TableSection::ReferencedBy,
        TableSection::Triggers,
    ];

    /// Tag used in catalog rows and in diff keys
    pub fn as_str(&self) -> &'static str {
        match self {
            TableSection::Indexes => "indexes",
            TableSection::Checks => "checks",
            TableSection::ForeignKeys => "foreign_keys",
            TableSection::ReferencedBy => "referenced_by",
            TableSection::Triggers => "triggers",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

static NO_OBJECTS: BTreeMap<String, String> = BTreeMap::new();

/// Everything `table_schema` knows about one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// Ordered by position
    pub columns: Vec<ColumnDescriptor>,
    /// Object name -> definition. Sections without objects are absent, so
    /// two tables with the same objects always compare equal.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub objects: BTreeMap<TableSection, BTreeMap<String, String>>,
}

impl TableSchema {
    pub fn with_columns(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            objects: BTreeMap::new(),
        }
    }

    /// Builder-style [`TableSchema::add_object`], for tests
    pub fn with_object(mut self, section: TableSection, name: &str, definition: &str) -> Self {
        self.add_object(section, name.to_string(), definition.to_string());
        self
    }

    /// Record one object; returns false if the name was already taken
    pub fn add_object(&mut self, section: TableSection, name: String, definition: String) -> bool {
        self.objects
            .entry(section)
            .or_default()
            .insert(name, definition)
            .is_none()
    }

    pub fn section(&self, section: TableSection) -> &BTreeMap<String, String> {
        self.objects.get(&section).unwrap_or(&NO_OBJECTS)
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "columns".to_string(),
            Value::Array(self.columns.iter().map(ColumnDescriptor::to_value).collect()),
        );
        for (section, objects) in &self.objects {
            map.insert(section.as_str().to_string(), json!(objects));
        }
        Value::Object(map)
    }
}

/// Dimension-specific snapshot content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotData {
    /// Qualified table names
    Names(BTreeSet<String>),
    /// Number of tables in scope
    Count(u64),
    /// Qualified table name -> columns and attached objects
    Tables(BTreeMap<String, TableSchema>),
    /// Qualified name -> row count, byte size or sequence value
    Metrics(BTreeMap<String, u64>),
}

impl SnapshotData {
    pub fn shape(&self) -> Shape {
        match self {
            SnapshotData::Names(_) => Shape::Names,
            SnapshotData::Count(_) => Shape::Count,
            SnapshotData::Tables(_) => Shape::Tables,
            SnapshotData::Metrics(_) => Shape::Metrics,
        }
    }

    /// Number of entries (tables, sequences); a count snapshot has one
    pub fn len(&self) -> usize {
        match self {
            SnapshotData::Names(names) => names.len(),
            SnapshotData::Count(_) => 1,
            SnapshotData::Tables(tables) => tables.len(),
            SnapshotData::Metrics(metrics) => metrics.len(),
        }
    }
}

/// A normalized, immutable capture of one database for one dimension.
///
/// Holds no reference to the connection it came from. Equality is
/// structural: capture time and checksum do not take part.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    dimension: Dimension,
    captured_at: DateTime<Utc>,
    checksum: String,
    data: SnapshotData,
}

impl Snapshot {
    pub fn new(dimension: Dimension, data: SnapshotData) -> Self {
        let checksum = Self::compute_checksum(dimension, &data);
        Self {
            dimension,
            captured_at: Utc::now(),
            checksum,
            data,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn data(&self) -> &SnapshotData {
        &self.data
    }

    /// Compute checksum from snapshot content
    fn compute_checksum(dimension: Dimension, data: &SnapshotData) -> String {
        let mut hasher = Sha256::new();
        hasher.update(dimension.as_str().as_bytes());

        // BTree containers iterate in key order, so the digest is stable
        match data {
            SnapshotData::Names(names) => {
                for name in names {
                    hasher.update(format!("N:{}\n", name).as_bytes());
                }
            }
            SnapshotData::Count(count) => {
                hasher.update(format!("C:{}\n", count).as_bytes());
            }
            SnapshotData::Tables(tables) => {
                for (table, schema) in tables {
                    hasher.update(format!("T:{}\n", table).as_bytes());
                    for col in &schema.columns {
                        hasher.update(format!("{}.{}:{}\n", table, col.name, col.to_value()).as_bytes());
                    }
                    for (section, objects) in &schema.objects {
                        for (name, definition) in objects {
                            hasher.update(
                                format!("{}.{}.{}:{}\n", table, section.as_str(), name, definition)
                                    .as_bytes(),
                            );
                        }
                    }
                }
            }
            SnapshotData::Metrics(metrics) => {
                for (key, value) in metrics {
                    hasher.update(format!("M:{}={}\n", key, value).as_bytes());
                }
            }
        }

        format!("{:x}", hasher.finalize())
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension && self.data == other.data
    }
}

impl Eq for Snapshot {}
