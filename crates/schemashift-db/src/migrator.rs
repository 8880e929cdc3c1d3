use std::collections::BTreeSet;
use std::sync::Arc;

use schemashift_common::{Direction, Error, MigrationRecord, Result, RevertTarget};
use schemashift_config::DatabaseConfig;
use tracing::{error, info, warn};

use crate::connection::{ConfigConnector, Connection, Connector};
use crate::source::{DirectorySource, Migration, MigrationSource};
use crate::state_store::StateStore;

/// A migration whose up or down step failed, stopping the run.
#[derive(Debug)]
pub struct MigrationFailure {
    pub name: String,
    pub error: Error,
}

/// What one call to [`Migrator::run`] did.
#[derive(Debug)]
pub struct RunReport {
    pub direction: Direction,
    pub applied: Vec<String>,
    pub reverted: Vec<String>,
    /// Batch number shared by everything applied in this run.
    pub batch: Option<i64>,
    pub failure: Option<MigrationFailure>,
}

impl RunReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            applied: Vec::new(),
            reverted: Vec::new(),
            batch: None,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Nothing was applied or reverted and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.reverted.is_empty() && self.failure.is_none()
    }
}

/// Applied state of one migration, as reported by [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    pub record: Option<MigrationRecord>,
    /// False when the tracking table names a migration the source no longer has.
    pub in_source: bool,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.record.is_some()
    }
}

/// Names in `listing` absent from `applied`, keeping the listing's order.
pub fn pending_migrations(listing: &[String], applied: &BTreeSet<String>) -> Vec<String> {
    listing
        .iter()
        .filter(|name| !applied.contains(*name))
        .cloned()
        .collect()
}

/// Batch for a new `up` run, given the highest batch already stored.
/// Unlike a bare `MAX(batch)`, each run gets a fresh batch and an empty table starts at 1.
pub fn next_batch(max_batch: Option<i64>) -> i64 {
    max_batch.map_or(1, |b| b + 1)
}

/// Reconciles a migration source against the tracking table.
///
/// Each run opens its own connection and closes it before returning, whatever
/// the outcome.
pub struct Migrator {
    config: DatabaseConfig,
    store: StateStore,
    source: Box<dyn MigrationSource>,
    connector: Box<dyn Connector>,
    revert_target: RevertTarget,
}

impl Migrator {
    pub fn new(config: DatabaseConfig, source: impl MigrationSource + 'static) -> Result<Self> {
        let store = StateStore::new(config.migrations_table.clone())?;
        Ok(Self {
            connector: Box::new(ConfigConnector::new(config.clone())),
            config,
            store,
            source: Box::new(source),
            revert_target: RevertTarget::default(),
        })
    }

    /// Read migrations from the configured `migrations_dir`.
    pub fn from_config(config: DatabaseConfig) -> Result<Self> {
        let source = DirectorySource::new(config.migrations_dir.clone());
        Self::new(config, source)
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    pub fn with_revert_target(mut self, target: RevertTarget) -> Self {
        self.revert_target = target;
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    pub async fn up(&self) -> Result<RunReport> {
        self.run(Direction::Up).await
    }

    pub async fn down(&self) -> Result<RunReport> {
        self.run(Direction::Down).await
    }

    pub async fn run(&self, direction: Direction) -> Result<RunReport> {
        let mut conn = self.connector.connect().await?;

        let result = match direction {
            Direction::Up => self.apply_pending(&mut *conn).await,
            Direction::Down => self.revert_one(&mut *conn).await,
        };

        if let Err(e) = conn.close() {
            warn!("failed to close connection: {e}");
        }
        result
    }

    /// Every source migration with its tracking record, followed by records
    /// whose migration is gone from the source.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let mut conn = self.connector.connect().await?;
        let result = self.collect_status(&mut *conn).await;
        if let Err(e) = conn.close() {
            warn!("failed to close connection: {e}");
        }
        result
    }

    async fn collect_status(&self, conn: &mut dyn Connection) -> Result<Vec<MigrationStatus>> {
        self.store.ensure_table(conn).await?;
        let mut records = self.store.list_applied(conn).await?;
        let listing = self.source.list().await?;

        let mut statuses = Vec::with_capacity(listing.len());
        for name in listing {
            let record = records
                .iter()
                .position(|r| r.name == name)
                .map(|idx| records.remove(idx));
            statuses.push(MigrationStatus {
                name,
                record,
                in_source: true,
            });
        }
        statuses.extend(records.into_iter().map(|record| MigrationStatus {
            name: record.name.clone(),
            record: Some(record),
            in_source: false,
        }));
        Ok(statuses)
    }

    async fn apply_pending(&self, conn: &mut dyn Connection) -> Result<RunReport> {
        let mut report = RunReport::new(Direction::Up);

        self.store.ensure_table(conn).await?;
        let applied = self.store.applied_names(conn).await?;
        // Read once: everything applied in this run shares the batch.
        let batch = next_batch(self.store.max_batch(conn).await?);

        let listing = self.source.list().await?;
        let pending = pending_migrations(&listing, &applied);
        if pending.is_empty() {
            info!("nothing to migrate ({} already applied)", applied.len());
            return Ok(report);
        }

        info!("{} pending migration(s), batch {batch}", pending.len());
        report.batch = Some(batch);

        for name in pending {
            let migration = match self.source.load(&name).await {
                Ok(migration) => migration,
                Err(e) => {
                    error!("error loading migration {name}: {e}");
                    report.failure = Some(MigrationFailure {
                        error: Error::migration(&name, e),
                        name,
                    });
                    break;
                }
            };

            match self.apply_one(conn, &migration, batch).await? {
                Ok(()) => {
                    info!("executed migration: {name}");
                    report.applied.push(name);
                }
                Err(e) => {
                    error!("error executing migration {name}: {e}");
                    report.failure = Some(MigrationFailure {
                        error: Error::migration(&name, e),
                        name,
                    });
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Outer error: tracking table or transaction failure, fatal to the run.
    /// Inner error: the migration itself failed.
    async fn apply_one(
        &self,
        conn: &mut dyn Connection,
        migration: &Arc<dyn Migration>,
        batch: i64,
    ) -> Result<Result<()>> {
        let name = migration.name();

        if self.config.transactional {
            conn.begin().await?;
        }

        if let Err(e) = migration.up(conn).await {
            if self.config.transactional {
                rollback(conn, name).await;
            }
            return Ok(Err(e));
        }

        self.store.record(conn, name, batch).await?;

        if self.config.transactional {
            conn.commit().await?;
        }
        Ok(Ok(()))
    }

    async fn revert_one(&self, conn: &mut dyn Connection) -> Result<RunReport> {
        let mut report = RunReport::new(Direction::Down);

        self.store.ensure_table(conn).await?;
        let listing = self.source.list().await?;

        let Some(name) = self.revert_candidate(conn, &listing).await? else {
            return Ok(report);
        };

        let migration = match self.source.load(&name).await {
            Ok(migration) => migration,
            Err(e) => {
                error!("error loading migration {name}: {e}");
                report.failure = Some(MigrationFailure {
                    error: Error::migration(&name, e),
                    name,
                });
                return Ok(report);
            }
        };

        if self.config.transactional {
            conn.begin().await?;
        }

        if let Err(e) = migration.down(conn).await {
            if self.config.transactional {
                rollback(conn, &name).await;
            }
            error!("error reverting migration {name}: {e}");
            report.failure = Some(MigrationFailure {
                error: Error::migration(&name, e),
                name,
            });
            return Ok(report);
        }

        self.store.remove(conn, &name).await?;

        if self.config.transactional {
            conn.commit().await?;
        }

        info!("reverted migration: {name}");
        report.reverted.push(name);
        Ok(report)
    }

    async fn revert_candidate(
        &self,
        conn: &mut dyn Connection,
        listing: &[String],
    ) -> Result<Option<String>> {
        match self.revert_target {
            RevertTarget::LastInDirectory => {
                let Some(last) = listing.last() else {
                    info!("no migrations found; nothing to revert");
                    return Ok(None);
                };
                let applied = self.store.applied_names(conn).await?;
                if !applied.contains(last) {
                    info!("latest migration {last} is not applied; nothing to revert");
                    return Ok(None);
                }
                Ok(Some(last.clone()))
            }
            RevertTarget::LastApplied => {
                let Some(record) = self.store.last_applied(conn).await? else {
                    info!("no applied migrations; nothing to revert");
                    return Ok(None);
                };
                if !listing.contains(&record.name) {
                    return Err(Error::NotFound(format!(
                        "migration {} is recorded as applied but missing from {}",
                        record.name,
                        self.config.migrations_dir.display()
                    )));
                }
                Ok(Some(record.name))
            }
        }
    }
}

async fn rollback(conn: &mut dyn Connection, name: &str) {
    if let Err(e) = conn.rollback().await {
        warn!("failed to roll back transaction for {name}: {e}");
    }
}
