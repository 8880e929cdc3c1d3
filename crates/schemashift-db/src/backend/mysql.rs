use async_trait::async_trait;
use ::mysql::prelude::Queryable;
use ::mysql::{Conn, OptsBuilder, Params};
use schemashift_common::{Error, Result};
use schemashift_config::DatabaseConfig;
use tracing::info;

use crate::connection::{Connection, Dialect, Row, Value};

/// MySQL / MariaDB backend.
pub struct MySqlConnection {
    conn: Conn,
}

impl MySqlConnection {
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let init = session_init(config)?;
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .init(init);

        let conn = Conn::new(opts).map_err(|e| {
            Error::Connection(format!(
                "failed to connect to {}@{}:{}/{}: {e}",
                config.user, config.host, config.port, config.database
            ))
        })?;
        info!(
            "connected to mysql at {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self { conn })
    }
}

/// Statements run on every new session to apply charset and timezone.
fn session_init(config: &DatabaseConfig) -> Result<Vec<String>> {
    let mut init = Vec::new();

    if !config
        .charset
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Config(format!("invalid charset: {}", config.charset)));
    }
    init.push(format!("SET NAMES {}", config.charset));

    if config.timezone != "local" {
        if config.timezone.contains(['\'', '\\']) {
            return Err(Error::Config(format!("invalid timezone: {}", config.timezone)));
        }
        init.push(format!("SET time_zone = '{}'", config.timezone));
    }

    Ok(init)
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        params
            .iter()
            .map(|v| match v {
                Value::Null => ::mysql::Value::NULL,
                Value::Int(i) => ::mysql::Value::Int(*i),
                Value::Text(s) => ::mysql::Value::Bytes(s.clone().into_bytes()),
            })
            .collect(),
    )
}

fn from_mysql(value: ::mysql::Value) -> Value {
    use ::mysql::Value as V;
    match value {
        V::NULL => Value::Null,
        V::Bytes(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        V::Int(i) => Value::Int(i),
        V::UInt(u) => i64::try_from(u)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(u.to_string())),
        V::Float(f) => Value::Text(f.to_string()),
        V::Double(d) => Value::Text(d.to_string()),
        V::Date(y, mo, d, h, mi, s, _) => Value::Text(format!(
            "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"
        )),
        V::Time(neg, days, h, mi, s, _) => {
            let hours = u32::from(h) + days * 24;
            let sign = if neg { "-" } else { "" };
            Value::Text(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
        }
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        // DDL is not always accepted by the prepared-statement protocol.
        let result = if params.is_empty() {
            self.conn.query_drop(sql)
        } else {
            self.conn.exec_drop(sql, to_params(params))
        };
        result.map_err(|e| Error::Database(format!("{e}")))?;
        Ok(self.conn.affected_rows())
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let rows: Vec<::mysql::Row> = if params.is_empty() {
            self.conn.query(sql)
        } else {
            self.conn.exec(sql, to_params(params))
        }
        .map_err(|e| Error::Database(format!("query failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                Row(row
                    .unwrap_raw()
                    .into_iter()
                    .map(|cell| cell.map_or(Value::Null, from_mysql))
                    .collect())
            })
            .collect())
    }

    fn close(self: Box<Self>) -> Result<()> {
        drop(self.conn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_config() -> DatabaseConfig {
        DatabaseConfig {
            driver: schemashift_config::Driver::Mysql,
            host: "localhost".into(),
            user: "root".into(),
            password: String::new(),
            database: "app".into(),
            ..DatabaseConfig::sqlite("app")
        }
    }

    #[test]
    fn session_init_sets_charset_and_skips_local_timezone() {
        let init = session_init(&mysql_config()).unwrap();
        assert_eq!(init, vec!["SET NAMES utf8mb4".to_string()]);
    }

    #[test]
    fn session_init_sets_explicit_timezone() {
        let config = DatabaseConfig {
            timezone: "+00:00".into(),
            ..mysql_config()
        };
        let init = session_init(&config).unwrap();
        assert_eq!(init[1], "SET time_zone = '+00:00'");
    }

    #[test]
    fn session_init_rejects_injection() {
        let config = DatabaseConfig {
            charset: "utf8; DROP DATABASE app".into(),
            ..mysql_config()
        };
        assert!(session_init(&config).is_err());

        let config = DatabaseConfig {
            timezone: "UTC'; --".into(),
            ..mysql_config()
        };
        assert!(session_init(&config).is_err());
    }

    #[test]
    fn mysql_values_convert() {
        assert_eq!(from_mysql(::mysql::Value::NULL), Value::Null);
        assert_eq!(from_mysql(::mysql::Value::UInt(3)), Value::Int(3));
        assert_eq!(
            from_mysql(::mysql::Value::Bytes(b"abc".to_vec())),
            Value::Text("abc".into())
        );
        assert_eq!(
            from_mysql(::mysql::Value::Date(2024, 1, 2, 3, 4, 5, 0)),
            Value::Text("2024-01-02 03:04:05".into())
        );
    }
}
