mod mysql;
mod sqlite;

pub use self::mysql::MySqlConnection;
pub use self::sqlite::SqliteConnection;
