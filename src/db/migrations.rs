use std::fs;
use std::io;
use std::path::Path;

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_migrations::{
    find_migrations_directory, revert_latest_migration_in_directory,
    run_pending_migrations_in_directory,
};
use log::info;

use super::error::StoreError;

#[derive(QueryableByName)]
struct AppliedMigration {
    #[sql_type = "Text"]
    version: String,
}

/// Applies every migration not yet recorded in `__diesel_schema_migrations`,
/// in version order, one transaction per step. Refuses to touch the database
/// if any step is missing its down.sql or the recorded history has diverged
/// from the migration directory.
pub fn run_pending(conn: &SqliteConnection) -> Result<(), StoreError> {
    let dir = find_migrations_directory()?;
    verify_revertible(&dir)?;
    verify_linear_history(conn, &dir)?;

    info!("applying pending migrations from {}", dir.display());
    run_pending_migrations_in_directory(conn, &dir, &mut io::sink())?;
    Ok(())
}

/// Rolls back the latest applied migration.
pub fn revert_one(conn: &SqliteConnection) -> Result<String, StoreError> {
    let dir = find_migrations_directory()?;
    verify_revertible(&dir)?;

    let version = revert_latest_migration_in_directory(conn, &dir)?;
    info!("reverted migration {}", version);
    Ok(version)
}

/// Rolls back everything, newest first, returning the reverted versions.
pub fn revert_all(conn: &SqliteConnection) -> Result<Vec<String>, StoreError> {
    let mut reverted = Vec::new();
    while !applied_versions(conn)?.is_empty() {
        reverted.push(revert_one(conn)?);
    }
    Ok(reverted)
}

pub fn pending_versions(conn: &SqliteConnection) -> Result<Vec<String>, StoreError> {
    let dir = find_migrations_directory()?;
    verify_linear_history(conn, &dir)?;

    let applied = applied_versions(conn)?;
    let mut available = available_versions(&dir)?;
    Ok(available.split_off(applied.len()))
}

pub fn applied_versions(conn: &SqliteConnection) -> Result<Vec<String>, StoreError> {
    let result =
        diesel::sql_query("SELECT version FROM __diesel_schema_migrations ORDER BY version")
            .load::<AppliedMigration>(conn);

    match result {
        Ok(rows) => Ok(rows.into_iter().map(|row| row.version).collect()),
        // Fresh database: the bookkeeping table only exists once the runner
        // has been invoked at least once.
        Err(diesel::result::Error::DatabaseError(_, ref info))
            if info.message().contains("no such table") =>
        {
            Ok(Vec::new())
        }
        Err(err) => Err(StoreError::Database(err)),
    }
}

/// Versions in the migration directory, sorted. Directories follow diesel's
/// `<version>_<name>` convention; the version is the prefix with separators
/// stripped, matching what diesel records in `__diesel_schema_migrations`
/// (`2020-02-23-120902_create_users` is applied as `20200223120902`).
pub fn available_versions(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name.contains('_') {
            continue;
        }
        let version: String = name
            .split('_')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        versions.push(version);
    }
    versions.sort();
    Ok(versions)
}

/// Every forward migration must carry its inverse.
pub fn verify_revertible(dir: &Path) -> Result<(), StoreError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name.contains('_') {
            continue;
        }
        if !entry.path().join("down.sql").exists() {
            return Err(StoreError::MissingDownScript(name));
        }
    }
    Ok(())
}

/// The applied versions must be a prefix of the known chain. Anything else
/// (an unknown applied version, a gap, a divergent order) means someone
/// produced a branching history, which this store rejects.
pub fn verify_linear_history(conn: &SqliteConnection, dir: &Path) -> Result<(), StoreError> {
    let applied = applied_versions(conn)?;
    let available = available_versions(dir)?;

    if applied.len() > available.len() {
        return Err(StoreError::BrokenHistory(format!(
            "{} migrations applied but only {} known",
            applied.len(),
            available.len()
        )));
    }

    for (got, want) in applied.iter().zip(available.iter()) {
        if got != want {
            return Err(StoreError::BrokenHistory(format!(
                "applied migration {} does not match known migration {}",
                got, want
            )));
        }
    }

    Ok(())
}
