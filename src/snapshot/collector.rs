//! Metric Collector
//!
//! Runs a dimension's catalog queries against one database and normalizes the
//! rows into a [`Snapshot`]. Collection is all-or-nothing: the first bad row
//! or failed query aborts it and no snapshot is produced.

use super::{ColumnDescriptor, Snapshot, SnapshotData, TableSchema, TableSection};
use crate::catalog::{CatalogQuery, CatalogRow, CatalogSource};
use crate::dimension::Dimension;
use crate::error::{malformed, AppError, AppResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Builds snapshots from catalog rows
pub struct MetricCollector;

impl MetricCollector {
    /// Collect one dimension from one database
    pub async fn collect<C: CatalogSource>(dimension: Dimension, source: &C) -> AppResult<Snapshot> {
        let plan: Vec<&str> = dimension.queries().iter().map(|q| q.name()).collect();
        debug!("Collecting {} using catalog queries [{}]", dimension, plan.join(", "));

        let data = match dimension {
            Dimension::TableName => SnapshotData::Names(Self::table_names(source).await?),
            Dimension::TableCount => {
                SnapshotData::Count(Self::table_names(source).await?.len() as u64)
            }
            Dimension::TableSchema => SnapshotData::Tables(Self::table_schemas(source).await?),
            Dimension::RowCount
            | Dimension::TableSize
            | Dimension::IndexSize
            | Dimension::TableTotalSize
            | Dimension::Sequence => SnapshotData::Metrics(Self::metrics(dimension, source).await?),
        };

        debug!("Collected {} with {} entries", dimension, data.len());

        Ok(Snapshot::new(dimension, data))
    }

    async fn fetch<C: CatalogSource>(source: &C, query: CatalogQuery) -> AppResult<Vec<CatalogRow>> {
        let rows = source.run_catalog_query(query).await?;
        debug!("Catalog query {} returned {} rows", query.name(), rows.len());
        Ok(rows)
    }

    async fn table_names<C: CatalogSource>(source: &C) -> AppResult<BTreeSet<String>> {
        let rows = Self::fetch(source, CatalogQuery::Tables).await?;

        rows.iter()
            .map(|row| row.qualified("table_schema", "table_name"))
            .collect()
    }

    async fn table_schemas<C: CatalogSource>(
        source: &C,
    ) -> AppResult<BTreeMap<String, TableSchema>> {
        // Seed with every table so column-less tables are still present
        let mut tables: BTreeMap<String, TableSchema> = Self::table_names(source)
            .await?
            .into_iter()
            .map(|name| (name, TableSchema::default()))
            .collect();

        for row in Self::fetch(source, CatalogQuery::Columns).await? {
            let table = row.qualified("table_schema", "table_name")?;
            let column = Self::column_descriptor(&row)?;
            tables.entry(table).or_default().columns.push(column);
        }

        for (table, schema) in tables.iter_mut() {
            let columns = &mut schema.columns;
            columns.sort_by_key(|c| c.ordinal_position);
            if let Some(pair) = columns.windows(2).find(|w| w[0].ordinal_position == w[1].ordinal_position) {
                return Err(malformed(format!(
                    "table {} has two columns at position {} ({}, {})",
                    table, pair[0].ordinal_position, pair[0].name, pair[1].name
                )));
            }
        }

        for row in Self::fetch(source, CatalogQuery::TableObjects).await? {
            let table = row.qualified("table_schema", "table_name")?;
            let tag = row.text("section")?;
            let section = TableSection::from_tag(tag)
                .ok_or_else(|| malformed(format!("unknown table section '{}' for {}", tag, table)))?;
            let name = row.text("object_name")?.to_string();
            let definition = row.text("definition")?.to_string();

            if !tables.entry(table.clone()).or_default().add_object(section, name.clone(), definition) {
                return Err(malformed(format!(
                    "table {} lists {} {} twice",
                    table,
                    section.as_str(),
                    name
                )));
            }
        }

        Ok(tables)
    }

    fn column_descriptor(row: &CatalogRow) -> AppResult<ColumnDescriptor> {
        let position = row.count("ordinal_position")?;
        let ordinal_position = u32::try_from(position)
            .map_err(|_| malformed(format!("ordinal position {} out of range", position)))?;

        Ok(ColumnDescriptor {
            name: row.text("column_name")?.to_string(),
            data_type: row.text("data_type")?.to_string(),
            nullable: row.bool("is_nullable")?,
            ordinal_position,
            default_value: row.opt_text("column_default")?.map(str::to_string),
            collation: row.opt_text("collation")?.map(str::to_string),
        })
    }

    async fn metrics<C: CatalogSource>(
        dimension: Dimension,
        source: &C,
    ) -> AppResult<BTreeMap<String, u64>> {
        let query = match dimension {
            Dimension::RowCount => CatalogQuery::RowCounts,
            Dimension::TableSize => CatalogQuery::TableSizes,
            Dimension::IndexSize => CatalogQuery::IndexSizes,
            Dimension::TableTotalSize => CatalogQuery::TotalSizes,
            Dimension::Sequence => CatalogQuery::Sequences,
            other => return Err(malformed(format!("{} is not a per-table metric", other))),
        };

        let mut metrics = BTreeMap::new();

        for row in Self::fetch(source, query).await? {
            let (key, value) = match query {
                CatalogQuery::RowCounts => (
                    row.qualified("table_schema", "table_name")?,
                    row.count("row_count")?,
                ),
                CatalogQuery::Sequences => {
                    let key = row.qualified("sequence_schema", "sequence_name")?;
                    // NULL is only "never used" when the role may read the sequence
                    if !row.bool("readable")? {
                        return Err(AppError::Query(format!(
                            "permission denied for sequence {}",
                            key
                        )));
                    }
                    let value = match row.opt_int("last_value")? {
                        Some(n) => u64::try_from(n)
                            .map_err(|_| malformed(format!("sequence value {} is negative", n)))?,
                        None => 0,
                    };
                    (key, value)
                }
                CatalogQuery::TotalSizes => {
                    let key = row.qualified("table_schema", "table_name")?;
                    let total = row.count("bytes")?;
                    Self::check_total(&key, total, row.count("table_bytes")?, row.count("index_bytes")?);
                    (key, total)
                }
                _ => (row.qualified("table_schema", "table_name")?, row.count("bytes")?),
            };

            if metrics.insert(key.clone(), value).is_some() {
                return Err(malformed(format!("{} reported twice for {}", dimension, key)));
            }
        }

        Ok(metrics)
    }

    /// The catalog aggregate is the reported value; a disagreement with
    /// table + indexes is surfaced but not corrected.
    fn check_total(table: &str, total: u64, table_bytes: u64, index_bytes: u64) -> bool {
        let sum = table_bytes.saturating_add(index_bytes);
        if total != sum {
            warn!(
                "table_total_size for {} is {} bytes but table ({}) + indexes ({}) = {}",
                table, total, table_bytes, index_bytes, sum
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{table_row as table, text, FakeCatalog};
    use crate::catalog::CatalogValue;
    use crate::error::AppError;
    use pretty_assertions::assert_eq;

    fn sized(name: &str, field: &str, n: i64) -> CatalogRow {
        table("public", name).with(field, CatalogValue::Int(n))
    }

    fn column(table_name: &str, name: &str, data_type: &str, nullable: bool, pos: i64) -> CatalogRow {
        table("public", table_name)
            .with("column_name", text(name))
            .with("data_type", text(data_type))
            .with("is_nullable", CatalogValue::Bool(nullable))
            .with("ordinal_position", CatalogValue::Int(pos))
            .with("column_default", CatalogValue::Null)
            .with("collation", CatalogValue::Null)
    }

    fn object(table_name: &str, section: &str, name: &str, definition: &str) -> CatalogRow {
        table("public", table_name)
            .with("section", text(section))
            .with("object_name", text(name))
            .with("definition", text(definition))
    }

    fn sequence(name: &str, value: CatalogValue, readable: bool) -> CatalogRow {
        CatalogRow::new()
            .with("sequence_schema", text("public"))
            .with("sequence_name", text(name))
            .with("last_value", value)
            .with("readable", CatalogValue::Bool(readable))
    }

    fn tables_fake() -> FakeCatalog {
        FakeCatalog::default().with_rows(
            CatalogQuery::Tables,
            vec![table("public", "users"), table("public", "orders"), table("audit", "users")],
        )
    }

    #[tokio::test]
    async fn test_table_names_are_qualified() {
        let snapshot = MetricCollector::collect(Dimension::TableName, &tables_fake()).await.unwrap();

        let expected: BTreeSet<String> = ["audit.users", "public.orders", "public.users"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(snapshot.data(), &SnapshotData::Names(expected));
        assert_eq!(snapshot.dimension(), Dimension::TableName);
    }

    #[tokio::test]
    async fn test_table_count_counts_qualified_tables() {
        let snapshot = MetricCollector::collect(Dimension::TableCount, &tables_fake()).await.unwrap();
        assert_eq!(snapshot.data(), &SnapshotData::Count(3));
    }

    #[tokio::test]
    async fn test_collection_is_idempotent() {
        let fake = tables_fake();
        let first = MetricCollector::collect(Dimension::TableName, &fake).await.unwrap();
        let second = MetricCollector::collect(Dimension::TableName, &fake).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.checksum(), second.checksum());
    }

    #[tokio::test]
    async fn test_schema_orders_columns_by_position() {
        let fake = FakeCatalog::default()
            .with_rows(CatalogQuery::Tables, vec![table("public", "users"), table("public", "empty")])
            .with_rows(
                CatalogQuery::Columns,
                vec![
                    column("users", "email", "character varying", true, 2),
                    column("users", "id", "integer", false, 1),
                ],
            );

        let snapshot = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap();
        let SnapshotData::Tables(tables) = snapshot.data() else {
            panic!("expected tables snapshot");
        };

        let names: Vec<&str> = tables["public.users"].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email"]);
        assert_eq!(tables["public.empty"], TableSchema::default());
    }

    #[tokio::test]
    async fn test_schema_collects_collation() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::Columns,
            vec![column("users", "name", "text", true, 1).with("collation", text("C"))],
        );

        let snapshot = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap();
        let SnapshotData::Tables(tables) = snapshot.data() else {
            panic!("expected tables snapshot");
        };
        assert_eq!(tables["public.users"].columns[0].collation.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_schema_collects_table_objects() {
        let fake = tables_fake()
            .with_rows(CatalogQuery::Columns, vec![column("users", "id", "integer", false, 1)])
            .with_rows(
                CatalogQuery::TableObjects,
                vec![
                    object(
                        "users",
                        "indexes",
                        "users_pkey",
                        "CREATE UNIQUE INDEX users_pkey ON public.users USING btree (id)",
                    ),
                    object(
                        "users",
                        "referenced_by",
                        "public.orders.orders_user_id_fkey",
                        "FOREIGN KEY (user_id) REFERENCES users(id)",
                    ),
                    object(
                        "orders",
                        "foreign_keys",
                        "orders_user_id_fkey",
                        "FOREIGN KEY (user_id) REFERENCES users(id)",
                    ),
                ],
            );

        let snapshot = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap();
        let SnapshotData::Tables(tables) = snapshot.data() else {
            panic!("expected tables snapshot");
        };

        let users = &tables["public.users"];
        assert_eq!(users.section(TableSection::Indexes).len(), 1);
        assert!(users
            .section(TableSection::ReferencedBy)
            .contains_key("public.orders.orders_user_id_fkey"));
        assert!(users.section(TableSection::Triggers).is_empty());
        assert!(tables["public.orders"]
            .section(TableSection::ForeignKeys)
            .contains_key("orders_user_id_fkey"));
        assert!(tables["audit.users"].objects.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_section_is_malformed() {
        let fake = tables_fake().with_rows(
            CatalogQuery::TableObjects,
            vec![object("users", "rules", "r1", "CREATE RULE r1 ...")],
        );

        let err = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
        assert!(err.to_string().contains("rules"));
    }

    #[tokio::test]
    async fn test_duplicate_table_object_is_malformed() {
        let idx = || object("users", "indexes", "users_pkey", "CREATE UNIQUE INDEX users_pkey ...");
        let fake = tables_fake().with_rows(CatalogQuery::TableObjects, vec![idx(), idx()]);

        let err = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
    }

    #[tokio::test]
    async fn test_schema_rejects_duplicate_positions() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::Columns,
            vec![
                column("users", "id", "integer", false, 1),
                column("users", "uid", "integer", false, 1),
            ],
        );

        let err = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
    }

    #[tokio::test]
    async fn test_missing_column_field_is_malformed() {
        let broken = table("public", "users")
            .with("column_name", text("email"))
            .with("is_nullable", CatalogValue::Bool(true))
            .with("ordinal_position", CatalogValue::Int(1))
            .with("column_default", CatalogValue::Null);
        let fake = FakeCatalog::default().with_rows(CatalogQuery::Columns, vec![broken]);

        let err = MetricCollector::collect(Dimension::TableSchema, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
        assert!(err.to_string().contains("data_type"));
    }

    #[tokio::test]
    async fn test_row_counts() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::RowCounts,
            vec![sized("users", "row_count", 100), sized("orders", "row_count", 50)],
        );

        let snapshot = MetricCollector::collect(Dimension::RowCount, &fake).await.unwrap();
        assert_eq!(
            snapshot.data(),
            &SnapshotData::Metrics(BTreeMap::from([
                ("public.orders".to_string(), 50),
                ("public.users".to_string(), 100),
            ]))
        );
    }

    #[tokio::test]
    async fn test_size_dimensions_use_their_own_query() {
        let fake = FakeCatalog::default()
            .with_rows(CatalogQuery::TableSizes, vec![sized("users", "bytes", 16384)])
            .with_rows(CatalogQuery::IndexSizes, vec![sized("users", "bytes", 8192)]);

        let table = MetricCollector::collect(Dimension::TableSize, &fake).await.unwrap();
        let index = MetricCollector::collect(Dimension::IndexSize, &fake).await.unwrap();

        assert_eq!(
            table.data(),
            &SnapshotData::Metrics(BTreeMap::from([("public.users".to_string(), 16384)]))
        );
        assert_eq!(
            index.data(),
            &SnapshotData::Metrics(BTreeMap::from([("public.users".to_string(), 8192)]))
        );
    }

    #[tokio::test]
    async fn test_total_size_reports_catalog_aggregate() {
        let row = sized("users", "bytes", 40960)
            .with("table_bytes", CatalogValue::Int(16384))
            .with("index_bytes", CatalogValue::Int(8192));
        let fake = FakeCatalog::default().with_rows(CatalogQuery::TotalSizes, vec![row]);

        let snapshot = MetricCollector::collect(Dimension::TableTotalSize, &fake).await.unwrap();
        assert_eq!(
            snapshot.data(),
            &SnapshotData::Metrics(BTreeMap::from([("public.users".to_string(), 40960)]))
        );
    }

    #[test]
    fn test_check_total() {
        assert!(MetricCollector::check_total("public.users", 24576, 16384, 8192));
        assert!(!MetricCollector::check_total("public.users", 40960, 16384, 8192));
    }

    #[tokio::test]
    async fn test_unused_sequence_reads_zero() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::Sequences,
            vec![
                sequence("users_id_seq", CatalogValue::Int(42), true),
                sequence("fresh_seq", CatalogValue::Null, true),
            ],
        );

        let snapshot = MetricCollector::collect(Dimension::Sequence, &fake).await.unwrap();
        assert_eq!(
            snapshot.data(),
            &SnapshotData::Metrics(BTreeMap::from([
                ("public.fresh_seq".to_string(), 0),
                ("public.users_id_seq".to_string(), 42),
            ]))
        );
    }

    #[tokio::test]
    async fn test_unreadable_sequence_is_query_error() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::Sequences,
            vec![
                sequence("users_id_seq", CatalogValue::Int(42), true),
                sequence("secret_seq", CatalogValue::Null, false),
            ],
        );

        let err = MetricCollector::collect(Dimension::Sequence, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::Query(_)));
        assert!(err.to_string().contains("public.secret_seq"));
    }

    #[tokio::test]
    async fn test_duplicate_metric_key_is_malformed() {
        let fake = FakeCatalog::default().with_rows(
            CatalogQuery::RowCounts,
            vec![sized("users", "row_count", 1), sized("users", "row_count", 2)],
        );
        let err = MetricCollector::collect(Dimension::RowCount, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
    }

    #[tokio::test]
    async fn test_negative_size_is_malformed() {
        let fake = FakeCatalog::default()
            .with_rows(CatalogQuery::TableSizes, vec![sized("users", "bytes", -1)]);
        let err = MetricCollector::collect(Dimension::TableSize, &fake).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedSnapshot(_)));
    }

    #[test]
    fn test_failures_propagate_unchanged() {
        let fake = FakeCatalog::failing(|| {
            AppError::Query("permission denied for table users (42501)".to_string())
        });

        let err = tokio_test::block_on(MetricCollector::collect(Dimension::RowCount, &fake)).unwrap_err();
        assert!(matches!(err, AppError::Query(_)));

        let fake = FakeCatalog::failing(|| AppError::Connection("connection refused".to_string()));
        let err = tokio_test::block_on(MetricCollector::collect(Dimension::TableName, &fake)).unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
    }
}
