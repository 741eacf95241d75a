// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crawl sources.
//!
//! The supervisor reads sources and records `last_run`; creating and
//! editing them belongs to the admin surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_jobs_core::{Source, SourceId};
use sqlx::SqlitePool;

use crate::error::{DbError, Result};
use crate::job::{format_timestamp, parse_timestamp};

#[async_trait]
pub trait SourceStore: Send + Sync {
	async fn create(&self, source: &Source) -> Result<()>;
	async fn get(&self, id: SourceId) -> Result<Option<Source>>;
	/// Active sources with a non-blank schedule.
	async fn list_scheduled(&self) -> Result<Vec<Source>>;
	async fn set_last_run(&self, id: SourceId, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
	id: String,
	name: String,
	source_type: String,
	schedule: Option<String>,
	is_active: bool,
	config: String,
	last_run: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<SourceRow> for Source {
	type Error = DbError;

	fn try_from(row: SourceRow) -> Result<Self> {
		Ok(Source {
			id: row
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid source id {}: {e}", row.id)))?,
			name: row.name,
			source_type: row.source_type,
			schedule: row.schedule,
			is_active: row.is_active,
			config: serde_json::from_str(&row.config)?,
			last_run: row.last_run.as_deref().map(parse_timestamp).transpose()?,
			created_at: parse_timestamp(&row.created_at)?,
			updated_at: parse_timestamp(&row.updated_at)?,
		})
	}
}

const SOURCE_COLUMNS: &str =
	"id, name, source_type, schedule, is_active, config, last_run, created_at, updated_at";

#[derive(Clone)]
pub struct SourceRepository {
	pool: SqlitePool,
}

impl SourceRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, source), fields(source_id = %source.id, source_type = %source.source_type))]
	pub async fn create_source(&self, source: &Source) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO sources (id, name, source_type, schedule, is_active, config, last_run, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(source.id.to_string())
		.bind(&source.name)
		.bind(&source.source_type)
		.bind(&source.schedule)
		.bind(source.is_active)
		.bind(serde_json::to_string(&source.config)?)
		.bind(source.last_run.map(format_timestamp))
		.bind(format_timestamp(source.created_at))
		.bind(format_timestamp(source.updated_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(source_id = %id))]
	pub async fn get_source(&self, id: SourceId) -> Result<Option<Source>> {
		let row = sqlx::query_as::<_, SourceRow>(&format!(
			"SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(Source::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_scheduled_sources(&self) -> Result<Vec<Source>> {
		let rows = sqlx::query_as::<_, SourceRow>(&format!(
			r#"
			SELECT {SOURCE_COLUMNS} FROM sources
			WHERE is_active = 1 AND schedule IS NOT NULL AND TRIM(schedule) != ''
			ORDER BY name
			"#
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(Source::try_from).collect()
	}

	#[tracing::instrument(skip(self), fields(source_id = %id))]
	pub async fn update_last_run(&self, id: SourceId, at: DateTime<Utc>) -> Result<()> {
		let result = sqlx::query("UPDATE sources SET last_run = ?, updated_at = ? WHERE id = ?")
			.bind(format_timestamp(at))
			.bind(format_timestamp(Utc::now()))
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("source {id}")));
		}

		Ok(())
	}
}

#[async_trait]
impl SourceStore for SourceRepository {
	async fn create(&self, source: &Source) -> Result<()> {
		self.create_source(source).await
	}

	async fn get(&self, id: SourceId) -> Result<Option<Source>> {
		self.get_source(id).await
	}

	async fn list_scheduled(&self) -> Result<Vec<Source>> {
		self.list_scheduled_sources().await
	}

	async fn set_last_run(&self, id: SourceId, at: DateTime<Utc>) -> Result<()> {
		self.update_last_run(id, at).await
	}
}
