use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemashift_common::{Error, MigrationRecord, Result};
use schemashift_config::loader::validate_identifier;
use tracing::{debug, warn};

use crate::connection::{Connection, Dialect, Row, Value};

/// Reads and writes the tracking table that records applied migrations.
///
/// Holds no connection of its own; every call borrows the run's connection.
#[derive(Debug, Clone)]
pub struct StateStore {
    table: String,
}

impl StateStore {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// DDL for the tracking table. The MySQL form is relied on by other tools
    /// and must not change.
    pub fn create_table_sql(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::Mysql => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  \
                 id INT AUTO_INCREMENT PRIMARY KEY,\n  \
                 name VARCHAR(255) NOT NULL,\n  \
                 batch INT DEFAULT 1,\n  \
                 executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
                 )",
                self.table
            ),
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  \
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
                 name VARCHAR(255) NOT NULL,\n  \
                 batch INT DEFAULT 1,\n  \
                 executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
                 )",
                self.table
            ),
        }
    }

    pub async fn ensure_table(&self, conn: &mut dyn Connection) -> Result<()> {
        let sql = self.create_table_sql(conn.dialect());
        conn.execute(&sql, &[]).await.map_err(|e| {
            Error::StateStore(format!("failed to create table {}: {e}", self.table))
        })?;
        debug!("tracking table {} ready", self.table);
        Ok(())
    }

    /// Every recorded migration, oldest insert first.
    pub async fn list_applied(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, name, batch, {} FROM {} ORDER BY id ASC",
            executed_at_column(conn.dialect()),
            self.table
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::StateStore(format!("failed to list applied migrations: {e}")))?;
        rows.iter().map(to_record).collect()
    }

    pub async fn applied_names(&self, conn: &mut dyn Connection) -> Result<BTreeSet<String>> {
        let sql = format!("SELECT name FROM {}", self.table);
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::StateStore(format!("failed to list applied migrations: {e}")))?;
        rows.iter()
            .map(|row| row.get_string(0).map_err(state_err))
            .collect()
    }

    /// Highest batch recorded, `None` on an empty table.
    pub async fn max_batch(&self, conn: &mut dyn Connection) -> Result<Option<i64>> {
        let sql = format!("SELECT MAX(batch) FROM {}", self.table);
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::StateStore(format!("failed to read max batch: {e}")))?;
        match rows.first() {
            Some(row) => row.get_opt_i64(0).map_err(state_err),
            None => Ok(None),
        }
    }

    /// The newest record: highest batch, then highest id.
    pub async fn last_applied(&self, conn: &mut dyn Connection) -> Result<Option<MigrationRecord>> {
        let sql = format!(
            "SELECT id, name, batch, {} FROM {} ORDER BY batch DESC, id DESC LIMIT 1",
            executed_at_column(conn.dialect()),
            self.table
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::StateStore(format!("failed to read last migration: {e}")))?;
        rows.first().map(to_record).transpose()
    }

    pub async fn record(&self, conn: &mut dyn Connection, name: &str, batch: i64) -> Result<()> {
        let sql = format!("INSERT INTO {} (name, batch) VALUES (?, ?)", self.table);
        conn.execute(&sql, &[Value::from(name), Value::Int(batch)])
            .await
            .map_err(|e| Error::StateStore(format!("failed to record migration {name}: {e}")))?;
        Ok(())
    }

    /// Delete the record for `name`. Removing an unknown name is a no-op.
    pub async fn remove(&self, conn: &mut dyn Connection, name: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE name = ?", self.table);
        let removed = conn
            .execute(&sql, &[Value::from(name)])
            .await
            .map_err(|e| Error::StateStore(format!("failed to remove migration {name}: {e}")))?;
        if removed == 0 {
            debug!("no tracking row for {name}");
        }
        Ok(())
    }
}

fn executed_at_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Mysql => "CAST(executed_at AS CHAR)",
        Dialect::Sqlite => "executed_at",
    }
}

fn state_err(e: Error) -> Error {
    Error::StateStore(format!("malformed tracking row: {e}"))
}

fn to_record(row: &Row) -> Result<MigrationRecord> {
    let name = row.get_string(1).map_err(state_err)?;

    let batch = match row.get_opt_i64(2).map_err(state_err)? {
        Some(batch) => batch,
        None => {
            warn!("tracking row {name} has no batch, treating it as batch 1");
            1
        }
    };

    let raw_executed_at = row.get_string(3).ok();
    let executed_at = match raw_executed_at.as_deref().and_then(parse_datetime) {
        Some(dt) => dt,
        None => {
            warn!(
                "tracking row {name} has unreadable executed_at {:?}, showing current time",
                raw_executed_at
            );
            Utc::now()
        }
    };

    Ok(MigrationRecord {
        id: row.get_i64(0).map_err(state_err)?,
        name,
        batch,
        executed_at,
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // CURRENT_TIMESTAMP renders as "YYYY-MM-DD HH:MM:SS" on both backends
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
