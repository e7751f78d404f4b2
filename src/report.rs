//! Report rendering
//!
//! Turns diff reports and single snapshots into text or JSON for stdout.

use crate::dimension::Dimension;
use crate::snapshot::{DiffKind, DiffReport, Snapshot, SnapshotData, TableSection};
use serde_json::{json, Value};
use std::fmt::Write;

/// Binary size with a single-letter unit, rounded down (e.g. `9K`)
pub fn human_size(bytes: u64) -> String {
    const UNITS: [(u64, &str); 6] = [
        (1 << 50, "P"),
        (1 << 40, "T"),
        (1 << 30, "G"),
        (1 << 20, "M"),
        (1 << 10, "K"),
        (1, "B"),
    ];

    for (factor, suffix) in UNITS {
        if bytes >= factor {
            return format!("{}{}", bytes / factor, suffix);
        }
    }
    "0B".to_string()
}

/// Integer with thousands separators (e.g. `1,234,567`)
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_metric(dimension: Dimension, n: u64) -> String {
    if dimension.is_size() {
        human_size(n)
    } else {
        format_count(n)
    }
}

fn render_value(dimension: Dimension, value: Option<&Value>) -> String {
    match value {
        None => "(absent)".to_string(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(n) if dimension.is_size() => format!("{} ({})", n, human_size(n)),
            _ => n.to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(table)) => match table.get("columns") {
            // A whole table: summarise instead of dumping every column
            Some(Value::Array(columns)) => format!("{} columns", columns.len()),
            _ => Value::Object(table.clone()).to_string(),
        },
        Some(other) => other.to_string(),
    }
}

/// Text rendering of a diff report
pub fn render_text(report: &DiffReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Diff Result ({}): {} -> {}\n",
        report.dimension, report.source_label, report.target_label
    );

    if report.is_empty() {
        out.push_str("They are the same.\n");
        return out;
    }

    let width = report.rows().map(|(_, key, _, _)| key.len()).max().unwrap_or(0);

    for (kind, key, source, target) in report.rows() {
        let line = match (source, target) {
            (Some(Value::Object(a)), Some(Value::Object(b))) => a
                .iter()
                .filter(|(field, value)| b.get(field.as_str()) != Some(*value))
                .map(|(field, value)| {
                    let other = b.get(field.as_str()).cloned().unwrap_or(Value::Null);
                    format!("{}: {} -> {}", field, value, other)
                })
                .collect::<Vec<_>>()
                .join(", "),
            // Set members carry no value beyond their key
            (None, Some(Value::String(name))) | (Some(Value::String(name)), None)
                if name.as_str() == key =>
            {
                String::new()
            }
            _ => format!(
                "{} -> {}",
                render_value(report.dimension, source),
                render_value(report.dimension, target)
            ),
        };

        let entry = format!("  {} {:<width$}  {}", kind.symbol(), key, line, width = width);
        let _ = writeln!(out, "{}", entry.trim_end());
    }

    let _ = writeln!(
        out,
        "\n{} differences: {} added, {} removed, {} changed",
        report.records.len(),
        report.count(DiffKind::Added),
        report.count(DiffKind::Removed),
        report.count(DiffKind::Changed)
    );

    out
}

/// JSON rendering of a diff report, optionally with both snapshots
pub fn render_json(
    report: &DiffReport,
    snapshots: Option<(&Snapshot, &Snapshot)>,
) -> serde_json::Result<String> {
    match snapshots {
        None => serde_json::to_string_pretty(report),
        Some((source, target)) => serde_json::to_string_pretty(&json!({
            "report": report,
            "source": source,
            "target": target,
        })),
    }
}

/// Human summary of one snapshot (info mode, and verbose compare mode)
pub fn render_snapshot(label: &str, snapshot: &Snapshot, verbose: bool) -> String {
    let dimension = snapshot.dimension();
    let title = dimension.as_str().replace('_', " ");
    let mut out = String::new();

    if verbose {
        let _ = writeln!(out, "Info Result ({}, {}):\n", label, dimension);
    }

    match snapshot.data() {
        SnapshotData::Names(names) => {
            if verbose {
                for name in names {
                    let _ = writeln!(out, "  {}", name);
                }
                out.push('\n');
            }
            let _ = writeln!(out, "Total tables: {}", format_count(names.len() as u64));
        }
        SnapshotData::Count(count) => {
            let _ = writeln!(out, "Total {}: {}", title, format_count(*count));
        }
        SnapshotData::Tables(tables) => {
            if verbose {
                for (table, schema) in tables {
                    let _ = writeln!(out, "  {}", table);
                    for col in &schema.columns {
                        let _ = writeln!(
                            out,
                            "    {:>3}  {}  {}{}{}{}",
                            col.ordinal_position,
                            col.name,
                            col.data_type,
                            col.collation
                                .as_deref()
                                .map(|c| format!(" collate {}", c))
                                .unwrap_or_default(),
                            if col.nullable { "" } else { " not null" },
                            col.default_value
                                .as_deref()
                                .map(|d| format!(" default {}", d))
                                .unwrap_or_default()
                        );
                    }
                    for (section, objects) in &schema.objects {
                        let _ = writeln!(out, "    {}:", section.as_str());
                        for (name, definition) in objects {
                            let _ = writeln!(out, "      {}  {}", name, definition);
                        }
                    }
                }
                out.push('\n');
            }
            let columns: usize = tables.values().map(|t| t.columns.len()).sum();
            let indexes: usize = tables.values().map(|t| t.section(TableSection::Indexes).len()).sum();
            let _ = writeln!(
                out,
                "Total tables: {}, columns: {}, indexes: {}",
                format_count(tables.len() as u64),
                format_count(columns as u64),
                format_count(indexes as u64)
            );
        }
        SnapshotData::Metrics(metrics) => {
            if verbose {
                // Largest first, ties by name
                let mut entries: Vec<(&String, &u64)> = metrics.iter().collect();
                entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
                for (key, value) in entries {
                    let _ = writeln!(out, "  {:>12}  {}", format_metric(dimension, *value), key);
                }
                out.push('\n');
            }
            let total = metrics.values().fold(0u64, |acc, v| acc.saturating_add(*v));
            let _ = writeln!(out, "Total {}: {}", title, format_metric(dimension, total));
        }
    }

    out
}
