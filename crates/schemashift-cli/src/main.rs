mod output;
mod scaffold;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemashift_common::RevertTarget;
use schemashift_config::{ConfigLoader, DEFAULT_CONFIG_FILE, DatabaseConfig};
use schemashift_db::Migrator;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemashift")]
#[command(version, about = "Versioned schema migrations for MySQL and SQLite")]
struct Cli {
    /// Config file (YAML, TOML or JSON). Defaults to ./migration.yaml when present.
    #[arg(long, global = true, env = "SCHEMASHIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured migrations directory
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a template migration.yaml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create a new timestamped migration file
    Create {
        /// Migration name, e.g. create_users_table
        name: String,
    },

    /// Apply all pending migrations
    Up,

    /// Revert one migration
    Down {
        /// last-applied, or last-file to revert the newest file only if it is applied
        #[arg(long, default_value = "last-applied")]
        target: RevertTarget,
    },

    /// List applied and pending migrations
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit with 1; --help and --version are not errors.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Init { force } => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            scaffold::write_config_template(&path, *force)?;
            println!("Created {} template", path.display());
        }
        Command::Create { name } => {
            let dir = match &cli.migrations_dir {
                Some(dir) => dir.clone(),
                None => load_config(&cli)?.migrations_dir,
            };
            let path = scaffold::create_migration(&dir, name, chrono::Utc::now())?;
            println!("Created migration: {}", path.display());
        }
        Command::Up => {
            let migrator = Migrator::from_config(load_config(&cli)?)?;
            let report = migrator.up().await.context("migration run failed")?;
            output::print_report(&report);
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Down { target } => {
            let migrator = Migrator::from_config(load_config(&cli)?)?.with_revert_target(*target);
            let report = migrator.down().await.context("revert failed")?;
            output::print_report(&report);
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status { json } => {
            let migrator = Migrator::from_config(load_config(&cli)?)?;
            let statuses = migrator.status().await.context("failed to read status")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&output::status_json(&statuses))?);
            } else {
                output::print_status(&statuses);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(cli: &Cli) -> Result<DatabaseConfig> {
    let mut loader = ConfigLoader::from_env();
    match &cli.config {
        Some(path) => loader = loader.file(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!("using {DEFAULT_CONFIG_FILE} from the working directory");
            loader = loader.file(DEFAULT_CONFIG_FILE);
        }
        None => {}
    }

    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    Ok(config)
}
