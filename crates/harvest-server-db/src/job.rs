// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable job records.
//!
//! A job is stored as one `jobs` row plus its append-only `job_timeline`
//! rows. Status changes go through [`JobStore::append_timeline_and_set_status`],
//! which validates the edge and writes both tables in one `BEGIN IMMEDIATE`
//! transaction. Writers queue on the database write lock and each re-reads
//! the row under it; the compare-and-swap on `(status, timeline_len)` backs
//! that up.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use harvest_jobs_core::{Job, JobId, JobPayload, JobStatus, JobType, TimelineEntry};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DbError, Result};
use crate::pool::{begin_immediate, finish_write};

/// Mutation applied to a job's payload inside the store's transaction.
pub type PayloadUpdate = Box<dyn FnOnce(&mut JobPayload) + Send>;

#[async_trait]
pub trait JobStore: Send + Sync {
	/// Persist a freshly built job.
	async fn create(&self, job: &Job) -> Result<JobId>;

	async fn get(&self, id: JobId) -> Result<Option<Job>>;

	async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>>;

	/// Jobs in `pending`, `running` or `hanging`, optionally restricted to `types`.
	async fn list_active(&self, types: Option<&[JobType]>) -> Result<Vec<Job>> {
		let jobs = self.list_by_status(&JobStatus::ACTIVE).await?;
		Ok(match types {
			Some(types) => jobs
				.into_iter()
				.filter(|job| types.contains(&job.job_type))
				.collect(),
			None => jobs,
		})
	}

	/// `running` jobs whose last write is older than `updated_before`.
	async fn list_stale(&self, updated_before: DateTime<Utc>) -> Result<Vec<Job>>;

	/// Validate and apply one lifecycle edge, appending exactly one timeline entry.
	///
	/// `error` replaces the stored error only when `Some`.
	async fn append_timeline_and_set_status(
		&self,
		id: JobId,
		status: JobStatus,
		message: &str,
		error: Option<String>,
	) -> Result<Job>;

	/// Merge into the payload without touching status or timeline.
	///
	/// Fails with `Conflict` if a non-terminal job would get a different
	/// `process_id` than the one already recorded.
	async fn update_payload(&self, id: JobId, update: PayloadUpdate) -> Result<Job>;
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
	id: String,
	job_type: String,
	status: String,
	timeline_len: i64,
	retries: i64,
	error: Option<String>,
	payload: String,
	created_at: String,
	updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TimelineRow {
	timestamp: String,
	status: String,
	message: String,
}

impl TryFrom<TimelineRow> for TimelineEntry {
	type Error = DbError;

	fn try_from(row: TimelineRow) -> Result<Self> {
		Ok(TimelineEntry {
			timestamp: parse_timestamp(&row.timestamp)?,
			status: row.status.parse().map_err(DbError::Internal)?,
			message: row.message,
		})
	}
}

impl JobRow {
	fn into_job(self, timeline: Vec<TimelineEntry>) -> Result<Job> {
		if timeline.len() as i64 != self.timeline_len {
			return Err(DbError::Internal(format!(
				"job {} has {} timeline rows, expected {}",
				self.id,
				timeline.len(),
				self.timeline_len
			)));
		}

		Ok(Job {
			id: self
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid job id {}: {e}", self.id)))?,
			job_type: JobType::from(self.job_type),
			status: self.status.parse().map_err(DbError::Internal)?,
			timeline,
			retries: u32::try_from(self.retries)
				.map_err(|_| DbError::Internal(format!("Invalid retry count {}", self.retries)))?,
			error: self.error,
			payload: serde_json::from_str(&self.payload)?,
			created_at: parse_timestamp(&self.created_at)?,
			updated_at: parse_timestamp(&self.updated_at)?,
		})
	}
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid timestamp {s}: {e}")))
}

const JOB_COLUMNS: &str =
	"id, job_type, status, timeline_len, retries, error, payload, created_at, updated_at";

async fn load_timeline(conn: &mut SqliteConnection, id: &str) -> Result<Vec<TimelineEntry>> {
	let rows = sqlx::query_as::<_, TimelineRow>(
		"SELECT timestamp, status, message FROM job_timeline WHERE job_id = ? ORDER BY seq",
	)
	.bind(id)
	.fetch_all(&mut *conn)
	.await?;

	rows.into_iter().map(TimelineEntry::try_from).collect()
}

async fn hydrate(conn: &mut SqliteConnection, row: JobRow) -> Result<Job> {
	let timeline = load_timeline(conn, &row.id).await?;
	row.into_job(timeline)
}

async fn load_job(conn: &mut SqliteConnection, id: JobId) -> Result<Option<Job>> {
	let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
		.bind(id.to_string())
		.fetch_optional(&mut *conn)
		.await?;

	match row {
		Some(row) => Ok(Some(hydrate(conn, row).await?)),
		None => Ok(None),
	}
}

async fn hydrate_all(conn: &mut SqliteConnection, rows: Vec<JobRow>) -> Result<Vec<Job>> {
	let mut jobs = Vec::with_capacity(rows.len());
	for row in rows {
		jobs.push(hydrate(conn, row).await?);
	}
	Ok(jobs)
}

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
	pub async fn create_job(&self, job: &Job) -> Result<JobId> {
		if job.timeline.is_empty() || !job.is_consistent() {
			return Err(DbError::Internal(format!(
				"job {} status does not match its timeline",
				job.id
			)));
		}

		let mut conn = self.pool.acquire().await?;
		begin_immediate(&mut conn).await?;
		let result = insert_job(&mut conn, job).await;
		finish_write(&mut conn, result).await?;

		tracing::debug!("job created");
		Ok(job.id)
	}

	#[tracing::instrument(skip(self), fields(job_id = %id))]
	pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
		let mut conn = self.pool.acquire().await?;
		load_job(&mut conn, id).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
		if statuses.is_empty() {
			return Ok(Vec::new());
		}

		let placeholders = vec!["?"; statuses.len()].join(", ");
		let sql = format!(
			"SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ({placeholders}) ORDER BY created_at"
		);

		let mut conn = self.pool.acquire().await?;
		let mut query = sqlx::query_as::<_, JobRow>(&sql);
		for status in statuses {
			query = query.bind(status.as_str());
		}
		let rows = query.fetch_all(&mut *conn).await?;

		hydrate_all(&mut conn, rows).await
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_stale_jobs(&self, updated_before: DateTime<Utc>) -> Result<Vec<Job>> {
		let mut conn = self.pool.acquire().await?;
		let rows = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? AND updated_at < ? ORDER BY updated_at"
		))
		.bind(JobStatus::Running.as_str())
		.bind(format_timestamp(updated_before))
		.fetch_all(&mut *conn)
		.await?;

		hydrate_all(&mut conn, rows).await
	}

	#[tracing::instrument(skip(self, message, error), fields(job_id = %id, to = %status))]
	pub async fn transition_job(
		&self,
		id: JobId,
		status: JobStatus,
		message: &str,
		error: Option<String>,
	) -> Result<Job> {
		let mut conn = self.pool.acquire().await?;
		begin_immediate(&mut conn).await?;
		let result = apply_transition(&mut conn, id, status, message, error).await;
		let (job, from) = finish_write(&mut conn, result).await?;

		tracing::info!(from = %from, "job status changed");
		Ok(job)
	}

	#[tracing::instrument(skip(self, update), fields(job_id = %id))]
	pub async fn update_job_payload(&self, id: JobId, update: PayloadUpdate) -> Result<Job> {
		let mut conn = self.pool.acquire().await?;
		begin_immediate(&mut conn).await?;
		let result = apply_payload_update(&mut conn, id, update).await;
		finish_write(&mut conn, result).await
	}
}

async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<()> {
	let id = job.id.to_string();
	let inserted = sqlx::query(
		r#"
		INSERT INTO jobs (id, job_type, status, timeline_len, retries, error, payload, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(&id)
	.bind(job.job_type.as_str())
	.bind(job.status.as_str())
	.bind(job.timeline.len() as i64)
	.bind(i64::from(job.retries))
	.bind(&job.error)
	.bind(serde_json::to_string(&job.payload)?)
	.bind(format_timestamp(job.created_at))
	.bind(format_timestamp(job.updated_at))
	.execute(&mut *conn)
	.await;

	if let Err(e) = inserted {
		if e.to_string().contains("UNIQUE constraint failed") {
			return Err(DbError::Conflict(format!("job {id} already exists")));
		}
		return Err(e.into());
	}

	for (seq, entry) in job.timeline.iter().enumerate() {
		insert_timeline_entry(conn, &id, seq, entry).await?;
	}
	Ok(())
}

/// Returns the updated job and the status it moved from.
async fn apply_transition(
	conn: &mut SqliteConnection,
	id: JobId,
	status: JobStatus,
	message: &str,
	error: Option<String>,
) -> Result<(Job, JobStatus)> {
	let mut job = load_job(conn, id)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
	let expected_status = job.status;
	let expected_len = job.timeline.len();

	job.apply_transition(status, message, error, Utc::now())?;

	let result = sqlx::query(
		r#"
		UPDATE jobs
		SET status = ?, timeline_len = ?, error = ?, updated_at = ?
		WHERE id = ? AND status = ? AND timeline_len = ?
		"#,
	)
	.bind(job.status.as_str())
	.bind(job.timeline.len() as i64)
	.bind(&job.error)
	.bind(format_timestamp(job.updated_at))
	.bind(id.to_string())
	.bind(expected_status.as_str())
	.bind(expected_len as i64)
	.execute(&mut *conn)
	.await?;

	if result.rows_affected() == 0 {
		return Err(DbError::Conflict(format!(
			"job {id} changed while moving {expected_status} -> {status}"
		)));
	}

	if let Some(entry) = job.timeline.last() {
		insert_timeline_entry(conn, &id.to_string(), expected_len, entry).await?;
	}
	Ok((job, expected_status))
}

async fn apply_payload_update(
	conn: &mut SqliteConnection,
	id: JobId,
	update: PayloadUpdate,
) -> Result<Job> {
	let mut job = load_job(conn, id)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
	let previous_pid = job.payload.process_id;

	update(&mut job.payload);

	if let (Some(old), Some(new)) = (previous_pid, job.payload.process_id) {
		if old != new && !job.status.is_terminal() {
			return Err(DbError::Conflict(format!(
				"job {id} is already bound to process {old}"
			)));
		}
	}

	job.updated_at = Utc::now();
	let result = sqlx::query(
		"UPDATE jobs SET payload = ?, updated_at = ? WHERE id = ? AND status = ? AND timeline_len = ?",
	)
	.bind(serde_json::to_string(&job.payload)?)
	.bind(format_timestamp(job.updated_at))
	.bind(id.to_string())
	.bind(job.status.as_str())
	.bind(job.timeline.len() as i64)
	.execute(&mut *conn)
	.await?;

	if result.rows_affected() == 0 {
		return Err(DbError::Conflict(format!(
			"job {id} changed during payload update"
		)));
	}
	Ok(job)
}

async fn insert_timeline_entry(
	conn: &mut SqliteConnection,
	job_id: &str,
	seq: usize,
	entry: &TimelineEntry,
) -> Result<()> {
	sqlx::query(
		"INSERT INTO job_timeline (job_id, seq, timestamp, status, message) VALUES (?, ?, ?, ?, ?)",
	)
	.bind(job_id)
	.bind(seq as i64)
	.bind(format_timestamp(entry.timestamp))
	.bind(entry.status.as_str())
	.bind(&entry.message)
	.execute(&mut *conn)
	.await?;
	Ok(())
}

#[async_trait]
impl JobStore for JobRepository {
	async fn create(&self, job: &Job) -> Result<JobId> {
		self.create_job(job).await
	}

	async fn get(&self, id: JobId) -> Result<Option<Job>> {
		self.get_job(id).await
	}

	async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
		self.list_jobs_by_status(statuses).await
	}

	async fn list_stale(&self, updated_before: DateTime<Utc>) -> Result<Vec<Job>> {
		self.list_stale_jobs(updated_before).await
	}

	async fn append_timeline_and_set_status(
		&self,
		id: JobId,
		status: JobStatus,
		message: &str,
		error: Option<String>,
	) -> Result<Job> {
		self.transition_job(id, status, message, error).await
	}

	async fn update_payload(&self, id: JobId, update: PayloadUpdate) -> Result<Job> {
		self.update_job_payload(id, update).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_file_test_pool, create_test_pool};
	use chrono::Duration;
	use harvest_jobs_core::TransitionError;
	use proptest::prelude::*;

	async fn make_repo() -> JobRepository {
		JobRepository::new(create_test_pool().await)
	}

	fn crawl_job() -> Job {
		Job::new(
			JobType::Ingest,
			JobPayload::new().with("source_id", "src-1"),
			"Crawl job created",
		)
	}

	#[tokio::test]
	async fn create_then_get_round_trips() {
		let repo = make_repo().await;
		let job = crawl_job();

		let id = repo.create(&job).await.unwrap();
		let loaded = repo.get(id).await.unwrap().unwrap();

		assert_eq!(loaded.id, job.id);
		assert_eq!(loaded.status, JobStatus::Pending);
		assert_eq!(loaded.timeline.len(), 1);
		assert_eq!(loaded.timeline[0].message, "Crawl job created");
		assert_eq!(loaded.payload.get_str("source_id"), Some("src-1"));
	}

	async fn running_job(repo: &JobRepository) -> Job {
		let job = crawl_job();
		repo.create(&job).await.unwrap();
		repo
			.transition_job(job.id, JobStatus::Running, "started", None)
			.await
			.unwrap()
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_transitions_are_serialized() {
		let dir = tempfile::tempdir().unwrap();
		let repo = JobRepository::new(create_file_test_pool(&dir.path().join("jobs.db")).await);

		for _ in 0..25 {
			let id = running_job(&repo).await.id;

			let hang = tokio::spawn({
				let repo = repo.clone();
				async move {
					repo
						.transition_job(id, JobStatus::Hanging, "stuck", Some("idle".into()))
						.await
				}
			});
			let cancel = tokio::spawn({
				let repo = repo.clone();
				async move {
					repo
						.transition_job(id, JobStatus::Cancelled, "cancelled by operator", None)
						.await
				}
			});
			let hang = hang.await.unwrap();
			let cancel = cancel.await.unwrap();

			// Running and Hanging both allow cancel, so cancel always lands.
			assert!(cancel.is_ok(), "cancel failed: {:?}", cancel.err());
			if let Err(e) = &hang {
				assert!(
					matches!(e, DbError::Transition(_) | DbError::Conflict(_)),
					"unexpected error: {e}"
				);
			}

			let stored = repo.get(id).await.unwrap().unwrap();
			assert_eq!(stored.status, JobStatus::Cancelled);
			assert_eq!(stored.timeline.len(), if hang.is_ok() { 4 } else { 3 });
			assert!(stored.is_consistent());
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn payload_update_racing_a_transition_keeps_both() {
		let dir = tempfile::tempdir().unwrap();
		let repo = JobRepository::new(create_file_test_pool(&dir.path().join("jobs.db")).await);

		for _ in 0..25 {
			let id = running_job(&repo).await.id;

			let update = tokio::spawn({
				let repo = repo.clone();
				async move {
					repo
						.update_job_payload(id, Box::new(|p: &mut JobPayload| p.insert("items_scraped", 120)))
						.await
				}
			});
			let finish = tokio::spawn({
				let repo = repo.clone();
				async move {
					repo
						.transition_job(id, JobStatus::Completed, "done", None)
						.await
				}
			});
			let update = update.await.unwrap();
			finish.await.unwrap().unwrap();

			let stored = repo.get(id).await.unwrap().unwrap();
			assert_eq!(stored.status, JobStatus::Completed);
			match update {
				Ok(_) => assert_eq!(stored.payload.get("items_scraped"), Some(&serde_json::json!(120))),
				Err(e) => assert!(matches!(e, DbError::Conflict(_)), "unexpected error: {e}"),
			}
		}
	}

	#[tokio::test]
	async fn get_unknown_job_is_none() {
		let repo = make_repo().await;
		assert!(repo.get(JobId::new()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn duplicate_create_conflicts() {
		let repo = make_repo().await;
		let job = crawl_job();
		repo.create(&job).await.unwrap();

		let err = repo.create(&job).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));

		// The failed write was rolled back, so the single connection is reusable.
		repo
			.transition_job(job.id, JobStatus::Running, "started", None)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn transition_appends_one_entry() {
		let repo = make_repo().await;
		let id = repo.create(&crawl_job()).await.unwrap();

		let job = repo
			.append_timeline_and_set_status(id, JobStatus::Running, "Spider started with PID 42", None)
			.await
			.unwrap();
		assert_eq!(job.status, JobStatus::Running);
		assert_eq!(job.timeline.len(), 2);

		let loaded = repo.get(id).await.unwrap().unwrap();
		assert_eq!(loaded.status, JobStatus::Running);
		assert_eq!(loaded.timeline[1].message, "Spider started with PID 42");
		assert!(loaded.is_consistent());
	}

	#[tokio::test]
	async fn illegal_transition_changes_nothing() {
		let repo = make_repo().await;
		let id = repo.create(&crawl_job()).await.unwrap();

		let err = repo
			.append_timeline_and_set_status(id, JobStatus::Completed, "done", None)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			DbError::Transition(TransitionError::InvalidEdge {
				from: JobStatus::Pending,
				to: JobStatus::Completed
			})
		));

		let loaded = repo.get(id).await.unwrap().unwrap();
		assert_eq!(loaded.status, JobStatus::Pending);
		assert_eq!(loaded.timeline.len(), 1);
	}

	#[tokio::test]
	async fn transition_on_missing_job_is_not_found() {
		let repo = make_repo().await;
		let err = repo
			.append_timeline_and_set_status(JobId::new(), JobStatus::Running, "x", None)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn error_only_overwritten_when_given() {
		let repo = make_repo().await;
		let id = repo.create(&crawl_job()).await.unwrap();
		repo
			.append_timeline_and_set_status(id, JobStatus::Running, "started", None)
			.await
			.unwrap();
		repo
			.append_timeline_and_set_status(
				id,
				JobStatus::Hanging,
				"Job appears to be hanging",
				Some("exceeded timeout of 3600s (runtime 3700s)".into()),
			)
			.await
			.unwrap();
		let job = repo
			.append_timeline_and_set_status(id, JobStatus::Cancelled, "force killed", None)
			.await
			.unwrap();

		assert_eq!(
			job.error.as_deref(),
			Some("exceeded timeout of 3600s (runtime 3700s)")
		);
	}

	#[tokio::test]
	async fn list_active_filters_by_status_and_type() {
		let repo = make_repo().await;
		let pending = repo.create(&crawl_job()).await.unwrap();
		let export = Job::new(JobType::Export, JobPayload::new(), "export");
		let export_id = repo.create(&export).await.unwrap();
		let done = repo.create(&crawl_job()).await.unwrap();
		repo
			.append_timeline_and_set_status(done, JobStatus::Cancelled, "cancelled", None)
			.await
			.unwrap();

		let all: Vec<_> = repo
			.list_active(None)
			.await
			.unwrap()
			.into_iter()
			.map(|j| j.id)
			.collect();
		assert_eq!(all.len(), 2);
		assert!(all.contains(&pending));
		assert!(all.contains(&export_id));

		let ingest_only = repo.list_active(Some(&[JobType::Ingest][..])).await.unwrap();
		assert_eq!(ingest_only.len(), 1);
		assert_eq!(ingest_only[0].id, pending);
	}

	#[tokio::test]
	async fn list_stale_returns_only_old_running_jobs() {
		let repo = make_repo().await;
		let running = repo.create(&crawl_job()).await.unwrap();
		repo
			.append_timeline_and_set_status(running, JobStatus::Running, "started", None)
			.await
			.unwrap();
		repo.create(&crawl_job()).await.unwrap();

		let future = Utc::now() + Duration::seconds(5);
		let stale = repo.list_stale(future).await.unwrap();
		assert_eq!(stale.len(), 1);
		assert_eq!(stale[0].id, running);

		let past = Utc::now() - Duration::hours(2);
		assert!(repo.list_stale(past).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn payload_update_keeps_status_and_timeline() {
		let repo = make_repo().await;
		let id = repo.create(&crawl_job()).await.unwrap();

		let job = repo
			.update_payload(
				id,
				Box::new(|payload| {
					payload.process_id = Some(4242);
					payload.log_path = Some("/var/log/harvest/job.log".into());
				}),
			)
			.await
			.unwrap();

		assert_eq!(job.status, JobStatus::Pending);
		assert_eq!(job.timeline.len(), 1);
		let loaded = repo.get(id).await.unwrap().unwrap();
		assert_eq!(loaded.process_id(), Some(4242));
		assert_eq!(loaded.payload.get_str("source_id"), Some("src-1"));
	}

	#[tokio::test]
	async fn payload_update_refuses_to_rebind_live_process() {
		let repo = make_repo().await;
		let id = repo.create(&crawl_job()).await.unwrap();
		repo
			.update_payload(id, Box::new(|p| p.process_id = Some(100)))
			.await
			.unwrap();

		let err = repo
			.update_payload(id, Box::new(|p| p.process_id = Some(200)))
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
		assert_eq!(repo.get(id).await.unwrap().unwrap().process_id(), Some(100));

		repo
			.append_timeline_and_set_status(id, JobStatus::Failed, "launch failed", Some("x".into()))
			.await
			.unwrap();
		let job = repo
			.update_payload(id, Box::new(|p| p.process_id = Some(200)))
			.await
			.unwrap();
		assert_eq!(job.process_id(), Some(200));
	}

	#[tokio::test]
	async fn rejects_inconsistent_job() {
		let repo = make_repo().await;
		let mut job = crawl_job();
		job.status = JobStatus::Running;
		assert!(matches!(
			repo.create(&job).await.unwrap_err(),
			DbError::Internal(_)
		));
	}

	#[test]
	fn timestamps_round_trip_at_microsecond_precision() {
		let now = Utc::now();
		let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
		assert!((now - parsed).num_microseconds().unwrap().abs() < 1);
	}

	fn any_status() -> impl Strategy<Value = JobStatus> {
		prop_oneof![
			Just(JobStatus::Pending),
			Just(JobStatus::Running),
			Just(JobStatus::Completed),
			Just(JobStatus::Failed),
			Just(JobStatus::Cancelled),
			Just(JobStatus::Hanging),
		]
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn stored_status_matches_stored_timeline(targets in proptest::collection::vec(any_status(), 1..8)) {
			let rt = tokio::runtime::Runtime::new().unwrap();
			rt.block_on(async {
				let repo = make_repo().await;
				let id = repo.create(&crawl_job()).await.unwrap();

				for to in targets {
					let _ = repo.append_timeline_and_set_status(id, to, "step", None).await;
					let job = repo.get(id).await.unwrap().unwrap();
					assert!(job.is_consistent());
				}
			});
		}
	}
}
