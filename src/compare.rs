//! Comparison run
//!
//! One run collects the source snapshot, then the target snapshot, then
//! diffs them. The two collections are sequential on purpose, and any
//! failure aborts the run with the side and dimension attached.

use crate::catalog::CatalogSource;
use crate::dimension::Dimension;
use crate::error::AppResult;
use crate::snapshot::{DiffEngine, DiffKind, DiffReport, MetricCollector, Snapshot};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::info;

/// Which database a value or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Everything a run produced, kept together for verbose output
#[derive(Debug)]
pub struct Comparison {
    pub source: Snapshot,
    pub target: Snapshot,
    pub report: DiffReport,
}

/// Collect one side, attributing any failure to it
pub async fn collect_side<C: CatalogSource>(
    side: Side,
    dimension: Dimension,
    db: &C,
) -> AppResult<Snapshot> {
    let started = Instant::now();
    let snapshot = MetricCollector::collect(dimension, db)
        .await
        .map_err(|e| e.on_side(side, dimension))?;

    info!(
        "Collected {} from {} ({} entries, {} ms)",
        dimension,
        side,
        snapshot.data().len(),
        started.elapsed().as_millis()
    );
    Ok(snapshot)
}

/// Compare `source` against `target` along `dimension`
pub async fn compare<S: CatalogSource, T: CatalogSource>(
    dimension: Dimension,
    source: &S,
    target: &T,
) -> AppResult<Comparison> {
    let source = collect_side(Side::Source, dimension, source).await?;
    let target = collect_side(Side::Target, dimension, target).await?;

    let report = DiffEngine::diff(dimension, &source, &target)?;
    info!(
        "Diff for {}: {} added, {} removed, {} changed",
        dimension,
        report.count(DiffKind::Added),
        report.count(DiffKind::Removed),
        report.count(DiffKind::Changed)
    );

    Ok(Comparison {
        source,
        target,
        report,
    })
}
