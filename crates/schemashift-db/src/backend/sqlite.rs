use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::Value as SqliteValue;
use schemashift_common::{Error, Result};
use tracing::info;

use crate::connection::{Connection, Dialect, Row, Value};

/// SQLite backend, mostly useful for local development and tests.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) the database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::in_memory();
        }

        info!("opening sqlite database at {}", path.display());
        let conn = rusqlite::Connection::open(path).map_err(|e| {
            Error::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::configure(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::Connection(format!("failed to open in-memory database: {e}")))?;
        Self::configure(conn)
    }

    fn configure(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(Self { conn })
    }
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Int(v) => SqliteValue::Integer(*v),
        Value::Text(s) => SqliteValue::Text(s.clone()),
    }
}

fn from_sqlite(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(v) => Value::Int(v),
        SqliteValue::Real(v) => Value::Text(v.to_string()),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let affected = self
            .conn
            .execute(sql, rusqlite::params_from_iter(params.iter().map(to_sqlite)))
            .map_err(|e| Error::Database(format!("{e}")))?;
        Ok(affected as u64)
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let columns = stmt.column_count();

        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(params.iter().map(to_sqlite)),
                |row| {
                    let mut cells = Vec::with_capacity(columns);
                    for idx in 0..columns {
                        cells.push(from_sqlite(row.get::<_, SqliteValue>(idx)?));
                    }
                    Ok(Row(cells))
                },
            )
            .map_err(|e| Error::Database(format!("query failed: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read row: {e}")))
    }

    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Database(format!("{e}")))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::Connection(format!("failed to close database: {e}")))
    }
}
