//! Running agent-issued SQL and turning results into JSON.
//!
//! Statements run unprepared (simple query protocol), so every column comes
//! back in text form and can be decoded whatever its type.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt as _;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{
    Column as _, Either, Executor as _, PgPool, Row, SqlitePool, TypeInfo as _, ValueRef as _,
};

use super::gate::ModificationGate;
use super::params::{code_outside_literals, interpolate};
use super::{is_connection_error, DatabaseConnection};

/// Leading keywords of statements that change data, schema, permissions or
/// the transaction itself.
const MODIFYING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "replace", "upsert", "truncate",
    "merge", "grant", "revoke", "comment", "copy", "call", "do", "lock", "vacuum", "reindex",
    "refresh", "cluster", "attach", "detach", "begin", "start", "commit", "end", "rollback",
    "abort", "savepoint", "release", "prepare", "execute",
];

/// Keywords that make a `WITH` or `EXPLAIN` statement change data.
const NESTED_MODIFYING_KEYWORDS: [&str; 4] = ["insert", "update", "delete", "merge"];

/// Leading keywords of statements that produce a result set.
const ROW_KEYWORDS: [&str; 7] = ["select", "with", "values", "show", "explain", "pragma", "table"];

/// Something the agent can run SQL against.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run `query` with `params`, describing success or failure as JSON.
    async fn run_query(&self, query: &str, params: &[Value], read_only: bool) -> Value;
}

/// A connected database behind the modification gate.
#[derive(Debug, Clone)]
pub struct Database {
    /// Pool.
    pub connection: DatabaseConnection,
    /// Shared with every request.
    pub gate: Arc<ModificationGate>,
}

impl Database {
    /// Wrap `connection`, asking `gate` before modifications.
    #[must_use]
    pub const fn new(connection: DatabaseConnection, gate: Arc<ModificationGate>) -> Self {
        Self { connection, gate }
    }
}

#[async_trait]
impl QueryRunner for Database {
    async fn run_query(&self, query: &str, params: &[Value], read_only: bool) -> Value {
        execute(&self.connection, &self.gate, query, params, read_only).await
    }
}

/// Whether any statement of `query` changes data or schema.
///
/// Statements are split on `;` outside quotes and comments. A `WITH` or
/// `EXPLAIN` statement counts when it wraps a data-changing statement.
#[must_use]
pub fn is_modification(query: &str) -> bool {
    code_outside_literals(query)
        .to_lowercase()
        .split(';')
        .any(statement_modifies)
}

/// Whether one statement, already stripped of literals, changes anything.
fn statement_modifies(statement: &str) -> bool {
    let mut words = statement
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty());
    let Some(first) = words.next() else {
        return false;
    };
    MODIFYING_KEYWORDS.contains(&first)
        || (matches!(first, "with" | "explain")
            && words.any(|word| NESTED_MODIFYING_KEYWORDS.contains(&word)))
}

/// Whether `query` is expected to return rows, even zero of them.
fn returns_rows(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    ROW_KEYWORDS.iter().any(|keyword| lowered.starts_with(keyword))
        || lowered.contains(" returning ")
        || lowered.contains("\nreturning ")
}

/// Run one agent query and describe the outcome as JSON.
///
/// Modifying statements go through `gate` first; `read_only` is advisory and
/// only logged, the statement text decides. Only approved statements are
/// committed: everything else runs in a transaction that is rolled back.
/// Failures are reported in the returned JSON so the agent can react to them.
#[tracing::instrument(name = "Database query", skip(connection, gate, params))]
pub async fn execute(
    connection: &DatabaseConnection,
    gate: &ModificationGate,
    query: &str,
    params: &[Value],
    read_only: bool,
) -> Value {
    let modification = is_modification(query);
    if modification && read_only {
        tracing::warn!("Statement flagged read-only modifies data");
    }
    if modification && !gate.permit(query, params).await {
        return json!({ "error": "Operation not authorized by user" });
    }

    let sql = match interpolate(query, params) {
        Ok(sql) => sql,
        Err(err) => {
            return json!({
                "error": "Query execution failed",
                "details": err.to_string(),
                "query": query,
            })
        }
    };

    let outcome = match *connection {
        DatabaseConnection::Postgres(ref pool) => run_postgres(pool, &sql, modification).await,
        DatabaseConnection::Sqlite(ref pool) => run_sqlite(pool, &sql, modification).await,
    };

    match outcome {
        Ok((rows, affected)) => {
            if rows.is_empty() && !returns_rows(query) {
                json!({ "status": "success", "rowCount": affected })
            } else {
                let count = rows.len();
                json!({ "status": "success", "data": rows, "rowCount": count })
            }
        }
        Err(err) if is_connection_error(&err) => {
            tracing::error!("Database connection failed: {err}");
            json!({ "error": "Database connection failed", "details": err.to_string() })
        }
        Err(err) => {
            tracing::debug!("Query failed: {err}");
            json!({
                "error": "Query execution failed",
                "details": err.to_string(),
                "query": query,
            })
        }
    }
}

/// Run `sql` on `PostgreSQL`, committing only when `commit` is set.
async fn run_postgres(
    pool: &PgPool,
    sql: &str,
    commit: bool,
) -> Result<(Vec<Value>, u64), sqlx::Error> {
    if commit {
        return run(pool.fetch_many(sql), postgres_row_to_json).await;
    }
    let mut tx = pool.begin().await?;
    let outcome = run((&mut *tx).fetch_many(sql), postgres_row_to_json).await;
    let rolled_back = tx.rollback().await;
    let result = outcome?;
    rolled_back?;
    Ok(result)
}

/// Run `sql` on `SQLite`, committing only when `commit` is set.
async fn run_sqlite(
    pool: &SqlitePool,
    sql: &str,
    commit: bool,
) -> Result<(Vec<Value>, u64), sqlx::Error> {
    if commit {
        return run(pool.fetch_many(sql), sqlite_row_to_json).await;
    }
    let mut tx = pool.begin().await?;
    let outcome = run((&mut *tx).fetch_many(sql), sqlite_row_to_json).await;
    let rolled_back = tx.rollback().await;
    let result = outcome?;
    rolled_back?;
    Ok(result)
}

/// Drain a `fetch_many` stream into JSON rows and the affected-row count.
async fn run<S, R, Q>(
    mut stream: S,
    to_json: fn(&R) -> Value,
) -> Result<(Vec<Value>, u64), sqlx::Error>
where
    S: futures::Stream<Item = Result<Either<Q, R>, sqlx::Error>> + Unpin,
    Q: RowsAffected,
{
    let mut rows = Vec::new();
    let mut affected = 0_u64;
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(result) => affected += result.rows_affected(),
            Either::Right(row) => rows.push(to_json(&row)),
        }
    }
    Ok((rows, affected))
}

/// Per-driver query results expose the affected-row count.
trait RowsAffected {
    /// Rows changed by the statement.
    fn rows_affected(&self) -> u64;
}

impl RowsAffected for sqlx::postgres::PgQueryResult {
    fn rows_affected(&self) -> u64 {
        Self::rows_affected(self)
    }
}

impl RowsAffected for sqlx::sqlite::SqliteQueryResult {
    fn rows_affected(&self) -> u64 {
        Self::rows_affected(self)
    }
}

/// Convert a `PostgreSQL` row to a JSON object keyed by column name.
fn postgres_row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_owned();
                postgres_value(row, idx, &type_name)
            }
            Err(_) => Value::Null,
        };
        object.insert(column.name().to_owned(), value);
    }
    Value::Object(object)
}

/// Decode one non-null `PostgreSQL` value.
fn postgres_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::from),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(Value::from),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(Value::from),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|stamp| Value::from(stamp.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|stamp| Value::from(stamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|date| Value::from(date.to_string())),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .map(|time| Value::from(time.to_string())),
        _ => row
            .try_get_unchecked::<String, _>(idx)
            .map(|text| text_value(type_name, text)),
    };
    decoded.unwrap_or_else(|err| {
        tracing::debug!(type_name, "Could not decode column: {err}");
        Value::Null
    })
}

/// Interpret text-form values of types without a dedicated decoder.
fn text_value(type_name: &str, text: String) -> Value {
    match type_name {
        "NUMERIC" => text
            .parse::<serde_json::Number>()
            .map_or(Value::String(text), Value::Number),
        "JSON" | "JSONB" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

/// Convert an `SQLite` row to a JSON object keyed by column name.
fn sqlite_row_to_json(row: &SqliteRow) -> Value {
    let mut object = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_owned();
                let decoded = match type_name.as_str() {
                    "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(Value::from),
                    "REAL" => row.try_get_unchecked::<f64, _>(idx).map(Value::from),
                    "BLOB" => row
                        .try_get_unchecked::<Vec<u8>, _>(idx)
                        .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned())),
                    _ => row.try_get_unchecked::<String, _>(idx).map(Value::from),
                };
                decoded.unwrap_or(Value::Null)
            }
            Err(_) => Value::Null,
        };
        object.insert(column.name().to_owned(), value);
    }
    Value::Object(object)
}
