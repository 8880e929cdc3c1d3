use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use schemashift_common::{Error, Result};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::sql::parse_sections;

/// File extensions picked up by [`DirectorySource`].
pub const MIGRATION_EXTENSIONS: &[&str] = &["sql"];

/// A named schema change with paired apply and revert steps.
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    async fn up(&self, conn: &mut dyn Connection) -> Result<()>;

    async fn down(&self, conn: &mut dyn Connection) -> Result<()>;
}

/// Somewhere migrations come from. Listings are re-read on every run.
#[async_trait]
pub trait MigrationSource: Send + Sync {
    /// All migration names, sorted ascending.
    async fn list(&self) -> Result<Vec<String>>;

    async fn load(&self, name: &str) -> Result<Arc<dyn Migration>>;
}

/// A migration defined by plain SQL scripts.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    /// Build from the contents of a sectioned `.sql` file.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let sections = parse_sections(content);
        Self::new(name, sections.up, sections.down)
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, conn: &mut dyn Connection) -> Result<()> {
        if self.up_sql.is_empty() {
            warn!("migration {} has an empty up section", self.name);
            return Ok(());
        }
        conn.execute_script(&self.up_sql).await
    }

    async fn down(&self, conn: &mut dyn Connection) -> Result<()> {
        if self.down_sql.is_empty() {
            warn!("migration {} has an empty down section", self.name);
            return Ok(());
        }
        conn.execute_script(&self.down_sql).await
    }
}

/// Migrations stored as `<timestamp>_<slug>.sql` files in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_migration_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MIGRATION_EXTENSIONS.iter().any(|known| *known == ext))
}

#[async_trait]
impl MigrationSource for DirectorySource {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("migrations directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Io(e));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_migration_file(&path) || !tokio::fs::metadata(&path).await?.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        debug!("found {} migration files in {}", names.len(), self.dir.display());
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn Migration>> {
        let path = self.dir.join(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "migration file {}",
                    path.display()
                )));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Arc::new(SqlMigration::parse(name, &content)))
    }
}

/// Migrations compiled into the binary, keyed by name.
#[derive(Default, Clone)]
pub struct StaticSource {
    migrations: BTreeMap<String, Arc<dyn Migration>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migration: impl Migration + 'static) {
        self.migrations
            .insert(migration.name().to_string(), Arc::new(migration));
    }

    pub fn with(mut self, migration: impl Migration + 'static) -> Self {
        self.register(migration);
        self
    }
}

#[async_trait]
impl MigrationSource for StaticSource {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.migrations.keys().cloned().collect())
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn Migration>> {
        self.migrations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("migration {name}")))
    }
}
