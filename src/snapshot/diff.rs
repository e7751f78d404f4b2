//! Diff Engine
//!
//! Compares two snapshots of the same dimension and produces a flat,
//! deterministically ordered list of differences. Sets are compared by
//! membership, scalars and per-table metrics by exact value, and table
//! schemas column by column, attribute by attribute, then object by object
//! for indexes, constraints and triggers.

use super::{ColumnDescriptor, Snapshot, SnapshotData, TableSchema, TableSection};
use crate::catalog::key_part;
use crate::compare::Side;
use crate::dimension::Dimension;
use crate::error::{malformed, AppError, AppResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Key used for the single `table_count` record
pub const TABLE_COUNT_KEY: &str = "table_count";

/// Type of difference detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Exists only in target
    Added,
    /// Exists only in source
    Removed,
    /// Exists in both with different values
    Changed,
}

impl DiffKind {
    pub fn symbol(&self) -> char {
        match self {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Changed => '~',
        }
    }
}

/// A single difference between the two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    pub kind: DiffKind,
    /// Full path to the differing entry (e.g. "public.users.email")
    pub key: String,
    pub source_value: Option<Value>,
    pub target_value: Option<Value>,
    /// Attributes that differ, for column-level changes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

impl DiffRecord {
    pub fn added(key: impl Into<String>, target: Value) -> Self {
        Self {
            kind: DiffKind::Added,
            key: key.into(),
            source_value: None,
            target_value: Some(target),
            changed_fields: Vec::new(),
        }
    }

    pub fn removed(key: impl Into<String>, source: Value) -> Self {
        Self {
            kind: DiffKind::Removed,
            key: key.into(),
            source_value: Some(source),
            target_value: None,
            changed_fields: Vec::new(),
        }
    }

    pub fn changed(key: impl Into<String>, source: Value, target: Value) -> Self {
        Self {
            kind: DiffKind::Changed,
            key: key.into(),
            source_value: Some(source),
            target_value: Some(target),
            changed_fields: Vec::new(),
        }
    }
}

/// Complete diff result for one comparison run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub dimension: Dimension,
    pub source_label: String,
    pub target_label: String,
    pub source_checksum: String,
    pub target_checksum: String,
    /// Sorted by key, then kind
    pub records: Vec<DiffRecord>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, kind: DiffKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    /// Flat view for renderers that know nothing about dimensions
    pub fn rows(&self) -> impl Iterator<Item = (DiffKind, &str, Option<&Value>, Option<&Value>)> {
        self.records.iter().map(|r| {
            (
                r.kind,
                r.key.as_str(),
                r.source_value.as_ref(),
                r.target_value.as_ref(),
            )
        })
    }
}

/// The diff engine that compares snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare source against target for `dimension`
    pub fn diff(dimension: Dimension, source: &Snapshot, target: &Snapshot) -> AppResult<DiffReport> {
        if source.dimension() != dimension || target.dimension() != dimension {
            return Err(AppError::DimensionMismatch {
                expected: dimension,
                source_dimension: source.dimension(),
                target_dimension: target.dimension(),
            });
        }

        Self::validate(Side::Source, source)?;
        Self::validate(Side::Target, target)?;

        let mut records = Vec::new();

        match (source.data(), target.data()) {
            (SnapshotData::Names(from), SnapshotData::Names(to)) => {
                Self::diff_names(from, to, &mut records);
            }
            (SnapshotData::Count(from), SnapshotData::Count(to)) => {
                if from != to {
                    records.push(DiffRecord::changed(TABLE_COUNT_KEY, json!(from), json!(to)));
                }
            }
            (SnapshotData::Tables(from), SnapshotData::Tables(to)) => {
                Self::diff_tables(from, to, &mut records);
            }
            (SnapshotData::Metrics(from), SnapshotData::Metrics(to)) => {
                Self::diff_keyed(from, to, &mut records, |v| json!(v), |key, a, b, records| {
                    if a != b {
                        records.push(DiffRecord::changed(key, json!(a), json!(b)));
                    }
                });
            }
            // validate() ties both shapes to the same dimension
            _ => return Err(malformed(format!("{} snapshots have different shapes", dimension))),
        }

        records.sort_by(|a, b| a.key.cmp(&b.key).then(a.kind.cmp(&b.kind)));

        Ok(DiffReport {
            dimension,
            source_label: Side::Source.to_string(),
            target_label: Side::Target.to_string(),
            source_checksum: source.checksum().to_string(),
            target_checksum: target.checksum().to_string(),
            records,
        })
    }

    /// Reject snapshots whose content cannot belong to their dimension
    fn validate(side: Side, snapshot: &Snapshot) -> AppResult<()> {
        let dimension = snapshot.dimension();
        if snapshot.data().shape() != dimension.shape() {
            return Err(malformed(format!(
                "{} snapshot for {} has {:?} content, expected {:?}",
                side,
                dimension,
                snapshot.data().shape(),
                dimension.shape()
            )));
        }

        if let SnapshotData::Tables(tables) = snapshot.data() {
            for (table, schema) in tables {
                let mut seen = BTreeSet::new();
                for col in &schema.columns {
                    if col.name.is_empty() || col.data_type.is_empty() {
                        return Err(malformed(format!(
                            "{} snapshot: column in {} is missing its name or type",
                            side, table
                        )));
                    }
                    if !seen.insert(col.name.as_str()) {
                        return Err(malformed(format!(
                            "{} snapshot: column {}.{} appears twice",
                            side, table, col.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn diff_names(from: &BTreeSet<String>, to: &BTreeSet<String>, records: &mut Vec<DiffRecord>) {
        for name in to.difference(from) {
            records.push(DiffRecord::added(name.as_str(), json!(name)));
        }
        for name in from.difference(to) {
            records.push(DiffRecord::removed(name.as_str(), json!(name)));
        }
    }

    /// Walk two keyed collections: one-sided keys become added/removed
    /// records, shared keys are handed to `on_both`.
    fn diff_keyed<V>(
        from: &BTreeMap<String, V>,
        to: &BTreeMap<String, V>,
        records: &mut Vec<DiffRecord>,
        to_value: impl Fn(&V) -> Value,
        mut on_both: impl FnMut(&str, &V, &V, &mut Vec<DiffRecord>),
    ) {
        for (key, value) in to {
            if !from.contains_key(key) {
                records.push(DiffRecord::added(key.as_str(), to_value(value)));
            }
        }

        for (key, from_value) in from {
            match to.get(key) {
                Some(other) => on_both(key, from_value, other, records),
                None => records.push(DiffRecord::removed(key.as_str(), to_value(from_value))),
            }
        }
    }

    fn diff_tables(
        from: &BTreeMap<String, TableSchema>,
        to: &BTreeMap<String, TableSchema>,
        records: &mut Vec<DiffRecord>,
    ) {
        Self::diff_keyed(from, to, records, TableSchema::to_value, |table, a, b, records| {
            Self::diff_columns(table, &a.columns, &b.columns, records);
            for section in TableSection::ALL {
                Self::diff_objects(table, section, a.section(section), b.section(section), records);
            }
        });
    }

    /// Column-level diff inside one table, keyed by "{table}.{column}"
    fn diff_columns(
        table: &str,
        from: &[ColumnDescriptor],
        to: &[ColumnDescriptor],
        records: &mut Vec<DiffRecord>,
    ) {
        let by_path = |columns: &[ColumnDescriptor]| -> BTreeMap<String, ColumnDescriptor> {
            columns
                .iter()
                .map(|c| (format!("{}.{}", table, key_part(&c.name)), c.clone()))
                .collect()
        };

        Self::diff_keyed(
            &by_path(from),
            &by_path(to),
            records,
            ColumnDescriptor::to_value,
            |path, a, b, records| {
                let changed = Self::changed_fields(a, b);
                if !changed.is_empty() {
                    let mut record = DiffRecord::changed(path, a.to_value(), b.to_value());
                    record.changed_fields = changed;
                    records.push(record);
                }
            },
        );
    }

    /// Named objects of one section, keyed by "{table}.{section}.{name}" and
    /// compared by definition
    fn diff_objects(
        table: &str,
        section: TableSection,
        from: &BTreeMap<String, String>,
        to: &BTreeMap<String, String>,
        records: &mut Vec<DiffRecord>,
    ) {
        let by_path = |objects: &BTreeMap<String, String>| -> BTreeMap<String, String> {
            objects
                .iter()
                .map(|(name, definition)| {
                    (
                        format!("{}.{}.{}", table, section.as_str(), key_part(name)),
                        definition.clone(),
                    )
                })
                .collect()
        };

        Self::diff_keyed(
            &by_path(from),
            &by_path(to),
            records,
            |definition| json!(definition),
            |path, a, b, records| {
                if a != b {
                    records.push(DiffRecord::changed(path, json!(a), json!(b)));
                }
            },
        );
    }

    /// Names of the descriptor attributes that differ, in descriptor order
    fn changed_fields(a: &ColumnDescriptor, b: &ColumnDescriptor) -> Vec<String> {
        a.fields()
            .into_iter()
            .zip(b.fields())
            .filter(|((_, left), (_, right))| left != right)
            .map(|((field, _), _)| field.to_string())
            .collect()
    }
}
