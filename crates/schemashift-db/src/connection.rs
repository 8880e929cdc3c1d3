use async_trait::async_trait;
use schemashift_common::{Error, Result};
use schemashift_config::{DatabaseConfig, Driver};

use crate::backend::{MySqlConnection, SqliteConnection};
use crate::sql::split_statements;

/// SQL flavour spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn begin_sql(self) -> &'static str {
        match self {
            Self::Mysql => "START TRANSACTION",
            Self::Sqlite => "BEGIN",
        }
    }
}

/// A parameter or result cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One result row, cells in select-list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn get_opt_i64(&self, idx: usize) -> Result<Option<i64>> {
        match self.get(idx) {
            None => Err(Error::Database(format!("column {idx} out of range"))),
            Some(Value::Null) => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(Value::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::Database(format!("column {idx} is not an integer: {s}"))),
        }
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64> {
        self.get_opt_i64(idx)?
            .ok_or_else(|| Error::Database(format!("column {idx} is NULL")))
    }

    pub fn get_string(&self, idx: usize) -> Result<String> {
        match self.get(idx) {
            None => Err(Error::Database(format!("column {idx} out of range"))),
            Some(Value::Null) => Err(Error::Database(format!("column {idx} is NULL"))),
            Some(Value::Int(v)) => Ok(v.to_string()),
            Some(Value::Text(s)) => Ok(s.clone()),
        }
    }
}

/// A live handle to the target database.
///
/// Statements run in autocommit mode unless wrapped in `begin`/`commit`.
#[async_trait]
pub trait Connection: Send {
    fn dialect(&self) -> Dialect;

    /// Run one statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a script of `;`-separated statements one at a time.
    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        for statement in split_statements(sql) {
            self.execute(&statement, &[]).await?;
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        let sql = self.dialect().begin_sql();
        self.execute(sql, &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Release the handle. Dropping without calling this also disconnects,
    /// but errors are then lost.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens a fresh connection for each run.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Connects to whatever backend the configuration names.
pub struct ConfigConnector {
    config: DatabaseConfig,
}

impl ConfigConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for ConfigConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        match self.config.driver {
            Driver::Mysql => Ok(Box::new(MySqlConnection::connect(&self.config)?)),
            Driver::Sqlite => Ok(Box::new(SqliteConnection::open(&self.config.database)?)),
        }
    }
}
