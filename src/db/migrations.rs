//! Checksum-verified, once-only schema migrations.
//!
//! Migration files are named `NNN_name.sql` and applied in version order.
//! Each application runs inside one transaction and records the version,
//! name, SHA-256 checksum and execution time in `schema_migrations`. A
//! version that is already recorded is skipped when the file still matches
//! its recorded checksum and refused outright when it does not.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::time::Instant;

use crate::db::Database;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(
        "migration {version} checksum mismatch: recorded {recorded}, file has {actual} \
         (applied migration files must never change)"
    )]
    ChecksumMismatch {
        version: i64,
        recorded: String,
        actual: String,
    },
    #[error("duplicate migration version {version} ({first} and {second})")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },
}

/// One migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub path: PathBuf,
    pub checksum: String,
    pub sql: String,
}

/// Load and order all migration files in `dir`. Filenames that do not match
/// `NNN_name.sql` are warned about and skipped; duplicate versions are an
/// error.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations: Vec<Migration> = Vec::new();

    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed reading migrations directory {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }

        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };

        let Some((version_part, name)) = stem.split_once('_') else {
            tracing::warn!(filename = %path.display(), "migration_invalid_filename");
            continue;
        };

        let Ok(version) = version_part.parse::<i64>() else {
            tracing::warn!(filename = %path.display(), "migration_invalid_version");
            continue;
        };
        if version < 0 {
            tracing::warn!(filename = %path.display(), "migration_invalid_version");
            continue;
        }

        let bytes = fs::read(&path)
            .with_context(|| format!("failed reading migration {}", path.display()))?;
        let sql = String::from_utf8(bytes.clone())
            .with_context(|| format!("migration {} is not valid UTF-8", path.display()))?;
        let checksum = hex::encode(Sha256::digest(&bytes));

        migrations.push(Migration {
            version,
            name: name.to_string(),
            path,
            checksum,
            sql,
        });
    }

    migrations.sort_by_key(|m| m.version);

    for pair in migrations.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(MigrationError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.display().to_string(),
                second: pair[1].path.display().to_string(),
            }
            .into());
        }
    }

    Ok(migrations)
}

pub struct MigrationRunner {
    db: Database,
    dir: PathBuf,
}

impl MigrationRunner {
    pub fn new(db: Database, dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            dir: dir.into(),
        }
    }

    /// Versions and checksums already recorded, or `None` on a fresh store
    /// where `schema_migrations` does not exist yet (it is created by the
    /// first migration).
    async fn applied(&self) -> Result<Option<HashMap<i64, String>>> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT FROM information_schema.tables
                 WHERE table_name = 'schema_migrations'
             )",
        )
        .fetch_one(self.db.pool())
        .await
        .context("failed checking for schema_migrations table")?;

        if !exists {
            return Ok(None);
        }

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT version, checksum FROM schema_migrations ORDER BY version")
                .fetch_all(self.db.pool())
                .await
                .context("failed reading applied migrations")?;

        Ok(Some(rows.into_iter().collect()))
    }

    /// Migrations not yet applied. Fails on a checksum mismatch for an
    /// already-applied version; nothing further may be applied then.
    pub async fn pending(&self) -> Result<Vec<Migration>> {
        let all = load_migrations(&self.dir)?;

        let applied = match self.applied().await? {
            None => {
                tracing::info!(pending_count = all.len(), "schema_migrations_not_found");
                return Ok(all);
            }
            Some(applied) => applied,
        };

        let mut pending = Vec::new();
        for migration in all {
            match applied.get(&migration.version) {
                None => pending.push(migration),
                Some(recorded) if *recorded == migration.checksum => {}
                Some(recorded) => {
                    tracing::error!(
                        version = migration.version,
                        name = %migration.name,
                        expected = %recorded,
                        actual = %migration.checksum,
                        "migration_checksum_mismatch"
                    );
                    return Err(MigrationError::ChecksumMismatch {
                        version: migration.version,
                        recorded: recorded.clone(),
                        actual: migration.checksum,
                    }
                    .into());
                }
            }
        }

        Ok(pending)
    }

    /// Apply all pending migrations. Returns how many ran.
    pub async fn apply_all(&self) -> Result<usize> {
        let pending = self.pending().await?;

        if pending.is_empty() {
            tracing::info!("migrations_up_to_date");
            return Ok(0);
        }

        tracing::info!(
            count = pending.len(),
            versions = ?pending.iter().map(|m| m.version).collect::<Vec<_>>(),
            "migrations_pending"
        );

        let applied_count = pending.len();
        for migration in pending {
            self.apply_one(&migration).await?;
        }

        tracing::info!(applied_count, "migrations_complete");
        Ok(applied_count)
    }

    /// Apply one migration as a single transactional batch.
    async fn apply_one(&self, migration: &Migration) -> Result<()> {
        let started = Instant::now();
        tracing::info!(
            version = migration.version,
            name = %migration.name,
            "migration_applying"
        );

        let result: Result<()> = async {
            let mut tx = self
                .db
                .pool()
                .begin()
                .await
                .context("failed opening migration transaction")?;

            sqlx::raw_sql(&migration.sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {} failed", migration.version))?;

            let execution_time_ms = started.elapsed().as_millis() as i64;
            sqlx::query(
                "INSERT INTO schema_migrations (version, name, checksum, execution_time_ms)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .bind(execution_time_ms)
            .execute(&mut *tx)
            .await
            .context("failed recording migration")?;

            tx.commit().await.context("failed committing migration")?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    version = migration.version,
                    name = %migration.name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "migration_applied"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    version = migration.version,
                    name = %migration.name,
                    error = %err,
                    "migration_failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_migration(dir: &Path, name: &str, body: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn discovers_and_orders_by_version() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "010_indexes.sql", "CREATE INDEX x ON t (c);");
        write_migration(tmp.path(), "001_initial.sql", "CREATE TABLE t (c INT);");
        write_migration(tmp.path(), "002_state.sql", "CREATE TABLE s (c INT);");

        let migrations = load_migrations(tmp.path()).unwrap();
        assert_eq!(
            migrations.iter().map(|m| m.version).collect::<Vec<_>>(),
            vec![1, 2, 10]
        );
        assert_eq!(migrations[0].name, "initial");
        assert_eq!(migrations[2].name, "indexes");
    }

    #[test]
    fn skips_files_without_version_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "001_initial.sql", "SELECT 1;");
        write_migration(tmp.path(), "README.sql", "not a migration");
        write_migration(tmp.path(), "notes.txt", "not even sql");
        write_migration(tmp.path(), "abc_initial.sql", "SELECT 1;");

        let migrations = load_migrations(tmp.path()).unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, 1);
    }

    #[test]
    fn keeps_full_name_after_first_underscore() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "003_route_state_tracking.sql", "SELECT 1;");

        let migrations = load_migrations(tmp.path()).unwrap();
        assert_eq!(migrations[0].name, "route_state_tracking");
    }

    #[test]
    fn rejects_duplicate_versions() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "001_one.sql", "SELECT 1;");
        write_migration(tmp.path(), "001_other.sql", "SELECT 2;");

        let err = load_migrations(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate migration version 1"));
    }

    #[test]
    fn checksum_tracks_file_content() {
        let tmp = tempfile::tempdir().unwrap();
        write_migration(tmp.path(), "001_initial.sql", "CREATE TABLE t (c INT);");
        let first = load_migrations(tmp.path()).unwrap()[0].checksum.clone();

        // Same content, same checksum.
        let again = load_migrations(tmp.path()).unwrap()[0].checksum.clone();
        assert_eq!(first, again);

        // Any edit changes the checksum.
        write_migration(tmp.path(), "001_initial.sql", "CREATE TABLE t (c BIGINT);");
        let changed = load_migrations(tmp.path()).unwrap()[0].checksum.clone();
        assert_ne!(first, changed);
        assert_eq!(changed.len(), 64);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("does-not-exist");
        assert!(load_migrations(&missing).is_err());
    }
}
