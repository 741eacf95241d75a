// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./harvest.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(Duration::from_secs(5))
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Open a write transaction that holds the database write lock from the start.
///
/// A deferred `BEGIN` that reads and then writes cannot wait on the busy
/// timeout when another connection commits first; SQLite fails it with
/// `SQLITE_BUSY` instead. Taking the lock up front makes concurrent writers
/// queue, so each one reads the state the previous writer committed.
pub(crate) async fn begin_immediate(conn: &mut SqliteConnection) -> Result<(), DbError> {
	sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
	Ok(())
}

/// Commit a transaction opened by [`begin_immediate`], or roll it back if
/// the work inside it failed.
pub(crate) async fn finish_write<T>(
	conn: &mut SqliteConnection,
	result: Result<T, DbError>,
) -> Result<T, DbError> {
	let outcome: Result<T, DbError> = match result {
		Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
			Ok(_) => return Ok(value),
			Err(e) => Err(e.into()),
		},
		Err(e) => Err(e),
	};

	if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
		tracing::warn!(error = %e, "rollback failed");
	}
	outcome
}

/// Apply the job and source schema.
///
/// Migrations are idempotent; re-running against an existing database is a no-op.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	let migrations = [
		("001_create_jobs", include_str!("../migrations/001_create_jobs.sql")),
		(
			"002_create_sources",
			include_str!("../migrations/002_create_sources.sql"),
		),
	];

	for (name, sql) in migrations {
		for stmt in sql.split(';').filter(|s| !is_blank(s)) {
			if let Err(e) = sqlx::query(stmt).execute(pool).await {
				let msg = e.to_string();
				if !msg.contains("already exists") && !msg.contains("duplicate column") {
					return Err(e.into());
				}
			}
		}
		tracing::debug!(migration = name, "migration applied");
	}

	Ok(())
}

fn is_blank(stmt: &str) -> bool {
	stmt
		.lines()
		.map(str::trim)
		.all(|line| line.is_empty() || line.starts_with("--"))
}
