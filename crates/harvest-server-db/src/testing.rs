// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test databases for this and downstream crates.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::pool::{create_pool, run_migrations};

/// A single-connection in-memory pool with the schema applied.
///
/// The connection is never recycled, so the database lives as long as the pool.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// A WAL database file at `path`, opened the way the server opens it.
///
/// Use this when a test needs several connections writing at once.
pub async fn create_file_test_pool(path: &Path) -> SqlitePool {
	let pool = create_pool(&format!("sqlite:{}", path.display()))
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}
