use std::path::{Path, PathBuf};

use schemashift_common::{Error, RevertTarget};
use schemashift_config::DatabaseConfig;
use schemashift_db::{Connection, Migrator, SqliteConnection, StateStore, Value};
use tempfile::TempDir;

/// A scratch database file plus a migrations directory next to it.
struct Workspace {
    _dir: TempDir,
    db_path: PathBuf,
    migrations_dir: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("app.db");
        let migrations_dir = dir.path().join("migrations");
        std::fs::create_dir(&migrations_dir).expect("create migrations dir");
        Self {
            _dir: dir,
            db_path,
            migrations_dir,
        }
    }

    fn config(&self) -> DatabaseConfig {
        let mut config = DatabaseConfig::sqlite(self.db_path.to_string_lossy());
        config.migrations_dir = self.migrations_dir.clone();
        config
    }

    fn migrator(&self) -> Migrator {
        Migrator::from_config(self.config()).expect("build migrator")
    }

    fn write(&self, name: &str, up: &str, down: &str) {
        let content = format!("-- migrate:up\n{up}\n\n-- migrate:down\n{down}\n");
        std::fs::write(self.migrations_dir.join(name), content).expect("write migration");
    }

    fn create_table_migration(&self, name: &str, table: &str) {
        self.write(
            name,
            &format!("CREATE TABLE {table} (id INT);"),
            &format!("DROP TABLE {table};"),
        );
    }

    async fn table_exists(&self, table: &str) -> bool {
        let mut conn = open(&self.db_path);
        let rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .await
            .unwrap();
        rows[0].get_i64(0).unwrap() == 1
    }

    async fn tracked(&self) -> Vec<(String, i64)> {
        let mut conn = open(&self.db_path);
        let store = StateStore::new("migrations").unwrap();
        store.ensure_table(&mut conn).await.unwrap();
        store
            .list_applied(&mut conn)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.batch))
            .collect()
    }
}

fn open(path: &Path) -> SqliteConnection {
    SqliteConnection::open(path).expect("open sqlite database")
}

#[tokio::test]
async fn up_creates_tracking_table_even_without_migrations() {
    let ws = Workspace::new();
    let report = ws.migrator().up().await.unwrap();

    assert!(report.is_noop());
    assert!(ws.table_exists("migrations").await);
}

#[tokio::test]
async fn up_applies_in_order_with_one_batch_and_down_reverts_the_last_file() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000001_second.sql", "test2");
    ws.create_table_migration("20240101000000_first.sql", "test1");

    let report = ws.migrator().up().await.unwrap();
    assert!(report.is_success());
    assert_eq!(
        report.applied,
        vec!["20240101000000_first.sql", "20240101000001_second.sql"]
    );
    assert!(ws.table_exists("test1").await);
    assert!(ws.table_exists("test2").await);

    let tracked = ws.tracked().await;
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked[0].1, tracked[1].1);

    let report = ws
        .migrator()
        .with_revert_target(RevertTarget::LastInDirectory)
        .down()
        .await
        .unwrap();
    assert_eq!(report.reverted, vec!["20240101000001_second.sql"]);
    assert!(ws.table_exists("test1").await);
    assert!(!ws.table_exists("test2").await);
    assert_eq!(
        ws.tracked().await,
        vec![("20240101000000_first.sql".to_string(), tracked[0].1)]
    );
}

#[tokio::test]
async fn second_up_runs_nothing() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");

    let first = ws.migrator().up().await.unwrap();
    assert_eq!(first.applied.len(), 1);

    let second = ws.migrator().up().await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.batch, None);
    assert_eq!(ws.tracked().await.len(), 1);
}

#[tokio::test]
async fn later_runs_get_a_new_batch() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");
    assert_eq!(ws.migrator().up().await.unwrap().batch, Some(1));

    ws.create_table_migration("20240102000000_second.sql", "test2");
    ws.create_table_migration("20240103000000_third.sql", "test3");
    let report = ws.migrator().up().await.unwrap();
    assert_eq!(report.batch, Some(2));

    let batches: Vec<i64> = ws.tracked().await.into_iter().map(|(_, b)| b).collect();
    assert_eq!(batches, vec![1, 2, 2]);
}

#[tokio::test]
async fn failing_migration_stops_the_run_and_leaves_the_rest_pending() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_a.sql", "a");
    ws.write("20240101000001_b.sql", "CREATE TABLE b (id INT;", "DROP TABLE b;");
    ws.create_table_migration("20240101000002_c.sql", "c");

    let report = ws.migrator().up().await.unwrap();

    assert_eq!(report.applied, vec!["20240101000000_a.sql"]);
    let failure = report.failure.expect("b should fail");
    assert_eq!(failure.name, "20240101000001_b.sql");
    assert!(matches!(failure.error, Error::Migration { .. }));

    let tracked: Vec<String> = ws.tracked().await.into_iter().map(|(n, _)| n).collect();
    assert_eq!(tracked, vec!["20240101000000_a.sql"]);
    assert!(!ws.table_exists("c").await);
}

#[tokio::test]
async fn apply_then_revert_round_trips() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_test_revert.sql", "test_revert");

    ws.migrator().up().await.unwrap();
    assert!(ws.table_exists("test_revert").await);

    let report = ws.migrator().down().await.unwrap();
    assert_eq!(report.reverted, vec!["20240101000000_test_revert.sql"]);
    assert!(!ws.table_exists("test_revert").await);
    assert!(ws.tracked().await.is_empty());
}

#[tokio::test]
async fn last_file_target_ignores_an_unapplied_last_file() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");
    ws.migrator().up().await.unwrap();
    ws.create_table_migration("20240101000001_pending.sql", "pending");

    let report = ws
        .migrator()
        .with_revert_target(RevertTarget::LastInDirectory)
        .down()
        .await
        .unwrap();

    assert!(report.is_noop());
    assert!(ws.table_exists("test1").await);
    assert_eq!(ws.tracked().await.len(), 1);
}

#[tokio::test]
async fn default_target_reverts_the_last_applied_migration() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");
    ws.create_table_migration("20240101000001_second.sql", "test2");
    ws.migrator().up().await.unwrap();
    ws.create_table_migration("20240101000002_pending.sql", "pending");

    let report = ws.migrator().down().await.unwrap();

    assert_eq!(report.reverted, vec!["20240101000001_second.sql"]);
    assert!(!ws.table_exists("test2").await);
    assert!(ws.table_exists("test1").await);
}

#[tokio::test]
async fn down_on_empty_tracking_table_is_a_noop() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");

    let report = ws.migrator().down().await.unwrap();
    assert!(report.is_noop());
}

#[tokio::test]
async fn reverting_a_migration_missing_from_disk_is_an_error() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");
    ws.migrator().up().await.unwrap();
    std::fs::remove_file(ws.migrations_dir.join("20240101000000_first.sql")).unwrap();

    let err = ws.migrator().down().await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(ws.tracked().await.len(), 1);
}

#[tokio::test]
async fn failed_revert_keeps_the_record() {
    let ws = Workspace::new();
    ws.write(
        "20240101000000_first.sql",
        "CREATE TABLE test1 (id INT);",
        "DROP TABLE does_not_exist;",
    );
    ws.migrator().up().await.unwrap();

    let report = ws.migrator().down().await.unwrap();
    assert!(report.reverted.is_empty());
    assert_eq!(report.failure.unwrap().name, "20240101000000_first.sql");
    assert_eq!(ws.tracked().await.len(), 1);
}

#[tokio::test]
async fn transactional_runs_roll_back_partial_migrations() {
    let ws = Workspace::new();
    ws.write(
        "20240101000000_partial.sql",
        "CREATE TABLE partial (id INT);\nINSERT INTO missing_table VALUES (1);",
        "DROP TABLE partial;",
    );

    let mut config = ws.config();
    config.transactional = true;
    let report = Migrator::from_config(config).unwrap().up().await.unwrap();

    assert!(report.failure.is_some());
    assert!(!ws.table_exists("partial").await);
    assert!(ws.tracked().await.is_empty());
}

#[tokio::test]
async fn non_transactional_runs_keep_partial_changes() {
    let ws = Workspace::new();
    ws.write(
        "20240101000000_partial.sql",
        "CREATE TABLE partial (id INT);\nINSERT INTO missing_table VALUES (1);",
        "DROP TABLE partial;",
    );

    let report = ws.migrator().up().await.unwrap();

    assert!(report.failure.is_some());
    assert!(ws.table_exists("partial").await);
    assert!(ws.tracked().await.is_empty());
}

#[tokio::test]
async fn status_reports_applied_pending_and_orphaned() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");
    ws.create_table_migration("20240101000001_gone.sql", "gone");
    ws.migrator().up().await.unwrap();
    std::fs::remove_file(ws.migrations_dir.join("20240101000001_gone.sql")).unwrap();
    ws.create_table_migration("20240101000002_pending.sql", "pending");

    let statuses = ws.migrator().status().await.unwrap();
    let summary: Vec<(&str, bool, bool)> = statuses
        .iter()
        .map(|s| (s.name.as_str(), s.is_applied(), s.in_source))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("20240101000000_first.sql", true, true),
            ("20240101000002_pending.sql", false, true),
            ("20240101000001_gone.sql", true, false),
        ]
    );
}

#[tokio::test]
async fn custom_tracking_table_name_is_used() {
    let ws = Workspace::new();
    ws.create_table_migration("20240101000000_first.sql", "test1");

    let mut config = ws.config();
    config.migrations_table = "schema_history".into();
    Migrator::from_config(config).unwrap().up().await.unwrap();

    assert!(ws.table_exists("schema_history").await);
    assert!(!ws.table_exists("migrations").await);
}

#[tokio::test]
async fn sql_above_a_lone_down_marker_is_applied() {
    let ws = Workspace::new();
    std::fs::write(
        ws.migrations_dir.join("20240101000000_first.sql"),
        "CREATE TABLE test1 (id INT);\n-- migrate:down\nDROP TABLE test1;\n",
    )
    .unwrap();

    let report = ws.migrator().up().await.unwrap();
    assert_eq!(report.applied, vec!["20240101000000_first.sql"]);
    assert!(ws.table_exists("test1").await);

    ws.migrator().down().await.unwrap();
    assert!(!ws.table_exists("test1").await);
}
