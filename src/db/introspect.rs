//! Schema introspection.
//!
//! The resulting [`Schema`] is stored in the configuration file and handed to
//! the LLM so that it can write SQL against real table and column names.
use std::collections::BTreeMap;

use sqlx::{PgPool, SqlitePool};

use super::DatabaseConnection;
use crate::config::{Column, ForeignKey, ForeignKeyTarget, Index, Schema, TableInfo};

/// Name under which `SQLite` tables are listed.
const SQLITE_SCHEMA: &str = "main";

/// Introspect every user table reachable through `connection`.
///
/// # Errors
/// Errors if any catalog query fails.
#[tracing::instrument(skip(connection))]
pub async fn introspect(connection: &DatabaseConnection) -> anyhow::Result<Schema> {
    let schema = match *connection {
        DatabaseConnection::Postgres(ref pool) => introspect_postgres(pool).await?,
        DatabaseConnection::Sqlite(ref pool) => introspect_sqlite(pool).await?,
    };
    let tables: usize = schema.values().map(BTreeMap::len).sum();
    tracing::info!(schemas = schema.len(), tables, "Introspected database schema");
    Ok(schema)
}

/// `PostgreSQL`: every schema but the system ones, base tables only.
async fn introspect_postgres(pool: &PgPool) -> anyhow::Result<Schema> {
    let schemas = sqlx::query_as::<_, (String,)>(
        "
        SELECT schema_name::text
        FROM information_schema.schemata
        WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
        ",
    )
    .fetch_all(pool)
    .await?;

    let mut db_schema = Schema::new();
    for (schema,) in schemas {
        let tables = sqlx::query_as::<_, (String,)>(
            "
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type = 'BASE TABLE'
            ",
        )
        .bind(&schema)
        .fetch_all(pool)
        .await?;

        let mut schema_tables = BTreeMap::new();
        for (table,) in tables {
            let info = postgres_table(pool, &schema, &table).await?;
            schema_tables.insert(table, info);
        }
        db_schema.insert(schema, schema_tables);
    }
    Ok(db_schema)
}

/// Columns, keys and indexes of one `PostgreSQL` table.
async fn postgres_table(pool: &PgPool, schema: &str, table: &str) -> anyhow::Result<TableInfo> {
    let columns = sqlx::query_as::<_, (String, String, String)>(
        "
        SELECT column_name::text, data_type::text, is_nullable::text
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        ",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(name, data_type, nullable)| Column {
        name,
        data_type,
        nullable: nullable == "YES",
    })
    .collect();

    let primary_keys = sqlx::query_as::<_, (String,)>(
        "
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
        ",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(column,)| column)
    .collect();

    let foreign_keys = sqlx::query_as::<_, (String, String, String, String)>(
        "
        SELECT
            kcu.column_name::text,
            ccu.table_schema::text AS foreign_table_schema,
            ccu.table_name::text AS foreign_table_name,
            ccu.column_name::text AS foreign_column_name
        FROM information_schema.table_constraints AS tc
        JOIN information_schema.key_column_usage AS kcu
        ON tc.constraint_name = kcu.constraint_name
        JOIN information_schema.constraint_column_usage AS ccu
        ON ccu.constraint_name = tc.constraint_name
        WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
        ",
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(column, ref_schema, ref_table, ref_column)| ForeignKey {
        column,
        references: ForeignKeyTarget {
            schema: ref_schema,
            table: ref_table,
            column: ref_column,
        },
    })
    .collect();

    let index_rows = sqlx::query_as::<_, (String, String)>(
        "
        SELECT
            i.relname::text AS index_name,
            a.attname::text AS column_name
        FROM
            pg_class t,
            pg_class i,
            pg_index ix,
            pg_attribute a,
            pg_namespace n
        WHERE
            t.oid = ix.indrelid
            AND i.oid = ix.indexrelid
            AND a.attrelid = t.oid
            AND a.attnum = ANY(ix.indkey)
            AND t.relkind = 'r'
            AND t.relname = $1
            AND n.oid = t.relnamespace
            AND n.nspname = $2
        ",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?;

    Ok(TableInfo {
        columns,
        primary_keys,
        foreign_keys,
        indexes: group_indexes(index_rows),
    })
}

/// Group `(index, column)` rows by index, keeping first-seen order.
fn group_indexes(rows: Vec<(String, String)>) -> Vec<Index> {
    let mut indexes: Vec<Index> = Vec::new();
    for (name, column) in rows {
        if let Some(index) = indexes.iter_mut().find(|index| index.name == name) {
            index.columns.push(column);
        } else {
            indexes.push(Index {
                name,
                columns: vec![column],
            });
        }
    }
    indexes
}

/// `SQLite`: every non-internal table of the main database.
async fn introspect_sqlite(pool: &SqlitePool) -> anyhow::Result<Schema> {
    let tables = sqlx::query_as::<_, (String,)>(
        "
        SELECT name
        FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        ",
    )
    .fetch_all(pool)
    .await?;

    let mut schema_tables = BTreeMap::new();
    for (table,) in tables {
        let info = sqlite_table(pool, &table).await?;
        schema_tables.insert(table, info);
    }
    let mut db_schema = Schema::new();
    db_schema.insert(SQLITE_SCHEMA.to_owned(), schema_tables);
    Ok(db_schema)
}

/// Columns, keys and indexes of one `SQLite` table.
async fn sqlite_table(pool: &SqlitePool, table: &str) -> anyhow::Result<TableInfo> {
    let column_rows = sqlx::query_as::<_, (String, String, i64, i64)>(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut keyed: Vec<(i64, String)> = column_rows
        .iter()
        .filter(|row| row.3 > 0)
        .map(|row| (row.3, row.0.clone()))
        .collect();
    keyed.sort();
    let primary_keys = keyed.into_iter().map(|(_, name)| name).collect();

    let columns = column_rows
        .into_iter()
        .map(|(name, data_type, not_null, pk)| Column {
            name,
            data_type,
            // SQLite lets non-integer primary keys hold NULL unless declared otherwise.
            nullable: not_null == 0 && pk == 0,
        })
        .collect();

    let foreign_keys = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )
    .bind(table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(column, ref_table, ref_column)| ForeignKey {
        references: ForeignKeyTarget {
            schema: SQLITE_SCHEMA.to_owned(),
            table: ref_table,
            column: ref_column.unwrap_or_else(|| column.clone()),
        },
        column,
    })
    .collect();

    let index_names = sqlx::query_as::<_, (String,)>(
        "SELECT name FROM pragma_index_list(?1) ORDER BY seq",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let mut indexes = Vec::with_capacity(index_names.len());
    for (name,) in index_names {
        let columns = sqlx::query_as::<_, (Option<String>,)>(
            "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
        )
        .bind(&name)
        .fetch_all(pool)
        .await?
        .into_iter()
        .filter_map(|(column,)| column)
        .collect();
        indexes.push(Index { name, columns });
    }

    Ok(TableInfo {
        columns,
        primary_keys,
        foreign_keys,
        indexes,
    })
}
