use schemashift_common::Direction;
use schemashift_db::{MigrationStatus, RunReport};
use serde_json::{Value, json};

/// Human summary of one run.
pub fn print_report(report: &RunReport) {
    match report.direction {
        Direction::Up => {
            for name in &report.applied {
                println!("Executed migration: {name}");
            }
        }
        Direction::Down => {
            for name in &report.reverted {
                println!("Reverted migration: {name}");
            }
        }
    }

    if let Some(failure) = &report.failure {
        let verb = match report.direction {
            Direction::Up => "executing",
            Direction::Down => "reverting",
        };
        eprintln!("Error {verb} migration {}: {}", failure.name, failure.error);
    } else if report.is_noop() {
        match report.direction {
            Direction::Up => println!("Nothing to migrate."),
            Direction::Down => println!("Nothing to revert."),
        }
    }
}

pub fn print_status(statuses: &[MigrationStatus]) {
    if statuses.is_empty() {
        println!("No migrations found.");
        return;
    }

    let width = statuses
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("Migration".len());

    println!("{:<width$}  {:<8}  {:>5}  Executed at", "Migration", "Status", "Batch");
    println!("{}", "─".repeat(width + 40));
    for status in statuses {
        println!("{}", status_line(status, width));
    }
}

fn status_line(status: &MigrationStatus, width: usize) -> String {
    let label = match (&status.record, status.in_source) {
        (Some(_), true) => "applied",
        (Some(_), false) => "missing",
        (None, _) => "pending",
    };
    match &status.record {
        Some(record) => format!(
            "{:<width$}  {label:<8}  {:>5}  {}",
            status.name,
            record.batch,
            record.executed_at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("{:<width$}  {label:<8}  {:>5}  -", status.name, "-"),
    }
}

pub fn status_json(statuses: &[MigrationStatus]) -> Value {
    Value::Array(
        statuses
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "applied": s.is_applied(),
                    "in_source": s.in_source,
                    "batch": s.record.as_ref().map(|r| r.batch),
                    "executed_at": s.record.as_ref().map(|r| r.executed_at.to_rfc3339()),
                })
            })
            .collect(),
    )
}
