use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration {name} failed: {message}")]
    Migration { name: String, message: String },

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any error raised while running a migration's up or down step.
    pub fn migration(name: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Migration {
            name: name.into(),
            message: source.to_string(),
        }
    }
}
