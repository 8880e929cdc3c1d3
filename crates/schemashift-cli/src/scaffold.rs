use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use schemashift_config::DatabaseConfig;
use tracing::info;

/// Write a starter config file with placeholder credentials.
pub fn write_config_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let yaml = serde_yaml::to_string(&DatabaseConfig::template())
        .context("failed to serialize config template")?;
    std::fs::write(path, &yaml).context(format!("failed to write {}", path.display()))?;

    info!("config template written to {}", path.display());
    Ok(())
}

/// `<14-digit UTC timestamp>_<slug>.sql`
pub fn migration_filename(name: &str, now: DateTime<Utc>) -> Result<String> {
    let slug = name.trim().replace([' ', '-'], "_");
    if slug.is_empty() {
        bail!("migration name cannot be empty");
    }
    if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("migration name '{name}' may only contain letters, digits, spaces, '-' and '_'");
    }
    Ok(format!("{}_{slug}.sql", now.format("%Y%m%d%H%M%S")))
}

fn migration_template(name: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {name}\n\
         -- Created: {}\n\
         \n\
         -- migrate:up\n\
         \n\
         \n\
         -- migrate:down\n\
         \n",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Create an empty migration in `dir`, creating the directory if needed.
pub fn create_migration(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .context(format!("failed to create migrations directory {}", dir.display()))?;

    let path = dir.join(migration_filename(name, now)?);
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    std::fs::write(&path, migration_template(name, now))
        .context(format!("failed to write {}", path.display()))?;
    info!("created migration {}", path.display());
    Ok(path)
}
