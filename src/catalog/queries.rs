//! SQL query constants
//!
//! Every statement here is read-only. Scope is the same everywhere: ordinary
//! and partitioned tables outside the system schemas and the replication
//! tooling schemas (`bucardo`, `pglogical`). Relations are addressed by oid
//! or through `format('%I.%I')`, never by bare name.

/// List all tables in scope
pub const LIST_TABLES: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2
"#;

/// Column descriptors for every table in scope.
///
/// `ordinal_position` is the column's rank among live columns, so a table
/// that once had a column dropped still lines up with a fresh copy of itself.
/// `collation` is only set when it differs from the type's default.
pub const LIST_COLUMNS: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        a.attname::text AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
        NOT a.attnotnull AS is_nullable,
        row_number() OVER (PARTITION BY a.attrelid ORDER BY a.attnum)::bigint AS ordinal_position,
        pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default,
        CASE WHEN a.attcollation <> t.typcollation THEN co.collname::text END AS collation
    FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        LEFT JOIN pg_catalog.pg_collation co ON co.oid = a.attcollation
    WHERE c.relkind IN ('r', 'p')
        AND a.attnum > 0
        AND NOT a.attisdropped
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2, 6
"#;

/// Exact `count(*)` per table, in a single statement and without creating
/// any helper function in the inspected database.
///
/// Rows are counted with `ONLY`, so a partitioned parent reports 0 and each
/// partition its own rows, the same per-relation accounting as the sizes.
pub const EXACT_ROW_COUNTS: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        (xpath(
            '/row/cnt/text()',
            query_to_xml(format('SELECT count(*) AS cnt FROM ONLY %I.%I', n.nspname, c.relname), false, true, '')
        ))[1]::text::bigint AS row_count
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2
"#;

/// Heap size (including TOAST, free space map and visibility map)
pub const TABLE_SIZES: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        pg_catalog.pg_table_size(c.oid)::bigint AS bytes
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2
"#;

/// Combined size of all indexes attached to each table
pub const INDEX_SIZES: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        pg_catalog.pg_indexes_size(c.oid)::bigint AS bytes
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2
"#;

/// Catalog aggregate total, with its two components read in the same row
/// so the collector can cross-check them
pub const TOTAL_SIZES: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        pg_catalog.pg_total_relation_size(c.oid)::bigint AS bytes,
        pg_catalog.pg_table_size(c.oid)::bigint AS table_bytes,
        pg_catalog.pg_indexes_size(c.oid)::bigint AS index_bytes
    FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'p')
        AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
        AND n.nspname !~ '^pg_(toast|temp)'
    ORDER BY 1, 2
"#;

/// Last value of every sequence.
///
/// `pg_sequences` shows NULL both for a sequence that was never used and for
/// one the current role may not read; `readable` tells the two apart.
pub const SEQUENCE_VALUES: &str = r#"
    SELECT
        s.schemaname::text AS sequence_schema,
        s.sequencename::text AS sequence_name,
        s.last_value::bigint AS last_value,
        pg_catalog.has_sequence_privilege(
            format('%I.%I', s.schemaname, s.sequencename), 'SELECT,USAGE'
        ) AS readable
    FROM pg_catalog.pg_sequences s
    WHERE s.schemaname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
    ORDER BY 1, 2
"#;

/// Named objects attached to each table in scope, one row per object:
/// indexes, check constraints, foreign keys, foreign keys of other tables
/// pointing here, and user triggers. `definition` is the server's own
/// rendering of the object.
///
/// Constraints cloned onto partitions are skipped (they belong to the
/// parent), as are triggers installed by bucardo or pglogical.
pub const TABLE_OBJECTS: &str = r#"
    WITH scoped AS (
        SELECT c.oid, n.nspname, c.relname
        FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
            AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'bucardo', 'pglogical')
            AND n.nspname !~ '^pg_(toast|temp)'
    )
    SELECT
        s.nspname::text AS table_schema,
        s.relname::text AS table_name,
        'indexes'::text AS section,
        ic.relname::text AS object_name,
        pg_catalog.pg_get_indexdef(i.indexrelid) AS definition
    FROM scoped s
        JOIN pg_catalog.pg_index i ON i.indrelid = s.oid
        JOIN pg_catalog.pg_class ic ON ic.oid = i.indexrelid
    UNION ALL
    SELECT s.nspname::text, s.relname::text, 'checks'::text, con.conname::text,
        pg_catalog.pg_get_constraintdef(con.oid)
    FROM scoped s
        JOIN pg_catalog.pg_constraint con ON con.conrelid = s.oid
    WHERE con.contype = 'c' AND con.conparentid = 0
    UNION ALL
    SELECT s.nspname::text, s.relname::text, 'foreign_keys'::text, con.conname::text,
        pg_catalog.pg_get_constraintdef(con.oid)
    FROM scoped s
        JOIN pg_catalog.pg_constraint con ON con.conrelid = s.oid
    WHERE con.contype = 'f' AND con.conparentid = 0
    UNION ALL
    SELECT s.nspname::text, s.relname::text, 'referenced_by'::text,
        format('%s.%s.%s', rn.nspname, rc.relname, con.conname),
        pg_catalog.pg_get_constraintdef(con.oid)
    FROM scoped s
        JOIN pg_catalog.pg_constraint con ON con.confrelid = s.oid
        JOIN pg_catalog.pg_class rc ON rc.oid = con.conrelid
        JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
    WHERE con.contype = 'f' AND con.conparentid = 0
    UNION ALL
    SELECT s.nspname::text, s.relname::text, 'triggers'::text, t.tgname::text,
        pg_catalog.pg_get_triggerdef(t.oid)
    FROM scoped s
        JOIN pg_catalog.pg_trigger t ON t.tgrelid = s.oid
    WHERE NOT t.tgisinternal
        AND t.tgname !~ '(bucardo|pglogical)'
        AND pg_catalog.pg_get_triggerdef(t.oid) !~ '(bucardo|pglogical)'
    ORDER BY 1, 2, 3, 4
"#;

/// Cheap round trip used to verify a session before collecting
pub const PING: &str = "SELECT 1";
