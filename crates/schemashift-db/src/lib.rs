pub mod backend;
pub mod connection;
pub mod migrator;
pub mod source;
pub mod sql;
pub mod state_store;

pub use backend::{MySqlConnection, SqliteConnection};
pub use connection::{ConfigConnector, Connection, Connector, Dialect, Row, Value};
pub use migrator::{MigrationFailure, MigrationStatus, Migrator, RunReport};
pub use source::{DirectorySource, Migration, MigrationSource, SqlMigration, StaticSource};
pub use state_store::StateStore;
