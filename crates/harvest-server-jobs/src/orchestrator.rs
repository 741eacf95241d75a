// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns "crawl this source" into a running, supervised worker.

use harvest_jobs_core::{
	Job, JobId, JobPayload, JobStatus, JobType, Source, SourceConfig, SourceId, TransitionError,
};
use harvest_server_db::{JobStore, SourceStore};
use harvest_server_process::{WorkerInvocation, WorkerLauncher};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::error::{JobError, Result};
use crate::policy::CrawlerSettings;

pub const CRAWL_JOB_CREATED: &str = "Crawl job created";

/// Worker (spider) name for a source type.
pub fn worker_for_source_type(source_type: &str) -> &'static str {
	match source_type.trim().to_ascii_lowercase().as_str() {
		"website" => "website_spider",
		"sitemap" => "sitemap_spider",
		"rss" | "feed" => "feed_spider",
		"api" => "api_spider",
		"document" => "document_spider",
		_ => "generic_spider",
	}
}

/// Parse and check a source's crawl configuration.
///
/// At least one start URL is required and every start URL must be an
/// absolute http(s) URL with a host.
pub fn validate_source_config(source: &Source) -> Result<SourceConfig> {
	let config = source.parsed_config().map_err(|e| {
		JobError::Configuration(format!(
			"invalid crawl configuration for source {}: {e}",
			source.name
		))
	})?;

	if config.start_urls.is_empty() {
		return Err(JobError::Configuration(format!(
			"source {} has no start_urls configured",
			source.name
		)));
	}

	for raw in &config.start_urls {
		let parsed = Url::parse(raw)
			.map_err(|e| JobError::Configuration(format!("invalid start URL {raw}: {e}")))?;
		if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
			return Err(JobError::Configuration(format!(
				"invalid start URL {raw}: expected an http(s) URL with a host"
			)));
		}
	}

	Ok(config)
}

/// Domains the worker may follow links into: the configured list, or the
/// start URL hosts in first-seen order.
fn allowed_domains(config: &SourceConfig) -> Vec<String> {
	if !config.allowed_domains.is_empty() {
		return config.allowed_domains.clone();
	}

	let mut domains: Vec<String> = Vec::new();
	for host in config
		.start_urls
		.iter()
		.filter_map(|raw| Url::parse(raw).ok())
		.filter_map(|url| url.host_str().map(str::to_string))
	{
		if !domains.contains(&host) {
			domains.push(host);
		}
	}
	domains
}

pub struct CrawlOrchestrator {
	jobs: Arc<dyn JobStore>,
	sources: Arc<dyn SourceStore>,
	launcher: Arc<dyn WorkerLauncher>,
	settings: CrawlerSettings,
}

impl CrawlOrchestrator {
	pub fn new(
		jobs: Arc<dyn JobStore>,
		sources: Arc<dyn SourceStore>,
		launcher: Arc<dyn WorkerLauncher>,
		settings: CrawlerSettings,
	) -> Self {
		Self {
			jobs,
			sources,
			launcher,
			settings,
		}
	}

	pub fn build_invocation(
		&self,
		source: &Source,
		config: &SourceConfig,
		job_id: JobId,
		worker: &str,
	) -> WorkerInvocation {
		let max_depth = config.max_depth.unwrap_or(self.settings.default_max_depth);
		let max_items = config.max_items.unwrap_or(self.settings.default_max_items);

		let mut args = self.settings.base_args.clone();
		args.push(worker.to_string());
		let mut push = |flag: &str, value: String| {
			args.push(flag.to_string());
			args.push(value);
		};
		push("-a", format!("source_id={}", source.id));
		push("-a", format!("job_id={job_id}"));
		push("-s", format!("DEPTH_LIMIT={max_depth}"));
		push("-s", format!("CLOSESPIDER_ITEMCOUNT={max_items}"));
		let domains = allowed_domains(config);
		if !domains.is_empty() {
			push("-a", format!("allowed_domains={}", domains.join(",")));
		}
		push("-a", format!("config={}", source.config));

		WorkerInvocation {
			program: self.settings.program.clone(),
			args,
			env: vec![
				("HARVEST_JOB_ID".to_string(), job_id.to_string()),
				("HARVEST_SOURCE_ID".to_string(), source.id.to_string()),
			],
			working_dir: self.settings.working_dir.clone(),
			log_name: format!("{worker}-{job_id}"),
		}
	}

	#[instrument(skip(self))]
	pub async fn trigger_crawl_by_id(&self, source_id: SourceId) -> Result<Job> {
		let source = self
			.sources
			.get(source_id)
			.await?
			.ok_or_else(|| JobError::SourceNotFound(source_id.to_string()))?;
		self.trigger_crawl(&source, None).await
	}

	/// Launch the crawl for a `pending` job, typically one produced by a retry.
	///
	/// The source comes from the job's `source_id` payload key.
	#[instrument(skip(self))]
	pub async fn launch_pending(&self, job_id: JobId) -> Result<Job> {
		let job = self
			.jobs
			.get(job_id)
			.await?
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
		let source_id = job
			.payload
			.get_str("source_id")
			.and_then(|raw| raw.parse::<SourceId>().ok())
			.ok_or_else(|| {
				JobError::Configuration(format!("job {job_id} has no valid source_id in its payload"))
			})?;
		let source = self
			.sources
			.get(source_id)
			.await?
			.ok_or_else(|| JobError::SourceNotFound(source_id.to_string()))?;
		self.trigger_crawl(&source, Some(job_id)).await
	}

	/// Launch a crawl for `source`.
	///
	/// With `existing_job`, that job must be `pending` and is reused instead of
	/// creating a new one; a configuration error then fails it.
	#[instrument(skip(self, source), fields(source_id = %source.id, source_type = %source.source_type))]
	pub async fn trigger_crawl(&self, source: &Source, existing_job: Option<JobId>) -> Result<Job> {
		let existing = match existing_job {
			Some(id) => {
				let job = self
					.jobs
					.get(id)
					.await?
					.ok_or_else(|| JobError::NotFound(id.to_string()))?;
				if job.status != JobStatus::Pending {
					return Err(TransitionError::NotLaunchable(job.status).into());
				}
				Some(job)
			}
			None => None,
		};

		let config = match validate_source_config(source) {
			Ok(config) => config,
			Err(e) => {
				if let Some(job) = &existing {
					self.fail_job(job.id, &e.to_string()).await;
				}
				warn!(error = %e, "crawl not started");
				return Err(e);
			}
		};

		let worker = worker_for_source_type(&source.source_type);
		let job = match existing {
			Some(job) => job,
			None => {
				let payload = JobPayload::new()
					.with("source_id", source.id.to_string())
					.with("source_name", source.name.as_str())
					.with("source_type", source.source_type.as_str())
					.with("worker_name", worker);
				let job = Job::new(JobType::Ingest, payload, CRAWL_JOB_CREATED);
				self.jobs.create(&job).await?;
				job
			}
		};

		let invocation = self.build_invocation(source, &config, job.id, worker);
		let launched = match self.launcher.launch(&invocation).await {
			Ok(launched) => launched,
			Err(e) => {
				self
					.fail_job(job.id, &format!("Failed to launch spider: {e}"))
					.await;
				return Err(e.into());
			}
		};

		let pid = launched.pid;
		let source_id = source.id.to_string();
		let source_name = source.name.clone();
		let source_type = source.source_type.clone();
		let record = self
			.jobs
			.update_payload(
				job.id,
				Box::new(move |payload| {
					payload.process_id = Some(pid);
					payload.log_path = launched.log_path;
					for (key, value) in [
						("source_id", source_id),
						("source_name", source_name),
						("source_type", source_type),
						("worker_name", worker.to_string()),
					] {
						payload.extra.entry(key).or_insert(value.into());
					}
				}),
			)
			.await;
		if let Err(e) = record {
			error!(job_id = %job.id, pid, error = %e, "worker started but its pid could not be recorded");
			self
				.fail_job(
					job.id,
					&format!("Spider started with PID {pid} but could not be recorded: {e}"),
				)
				.await;
			return Err(e.into());
		}

		let job = self
			.jobs
			.append_timeline_and_set_status(
				job.id,
				JobStatus::Running,
				&format!("Spider started with PID {pid}"),
				None,
			)
			.await?;

		info!(job_id = %job.id, pid, worker, "crawl started");
		Ok(job)
	}

	async fn fail_job(&self, id: JobId, message: &str) {
		if let Err(e) = self
			.jobs
			.append_timeline_and_set_status(id, JobStatus::Failed, message, Some(message.to_string()))
			.await
		{
			warn!(job_id = %id, error = %e, "failed to mark job failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::Harness;
	use async_trait::async_trait;
	use chrono::{DateTime, Utc};
	use harvest_server_db::{DbError, JobRepository, PayloadUpdate};
	use serde_json::json;

	fn council() -> Source {
		Source::new(
			"City Council",
			"website",
			json!({
				"start_urls": [
					"https://council.example.org/minutes",
					"https://www.example.org/agendas",
					"https://council.example.org/archive"
				],
				"max_depth": 2
			}),
		)
	}

	#[test]
	fn worker_table() {
		assert_eq!(worker_for_source_type("website"), "website_spider");
		assert_eq!(worker_for_source_type("sitemap"), "sitemap_spider");
		assert_eq!(worker_for_source_type("rss"), "feed_spider");
		assert_eq!(worker_for_source_type("Feed"), "feed_spider");
		assert_eq!(worker_for_source_type("api"), "api_spider");
		assert_eq!(worker_for_source_type("document"), "document_spider");
		assert_eq!(worker_for_source_type("ftp"), "generic_spider");
	}

	#[test]
	fn config_validation() {
		let empty = Source::new("a", "website", json!({"start_urls": []}));
		assert!(matches!(
			validate_source_config(&empty),
			Err(JobError::Configuration(_))
		));

		let relative = Source::new("a", "website", json!({"start_urls": ["/minutes"]}));
		assert!(matches!(
			validate_source_config(&relative),
			Err(JobError::Configuration(_))
		));

		let ftp = Source::new("a", "website", json!({"start_urls": ["ftp://example.org"]}));
		assert!(matches!(
			validate_source_config(&ftp),
			Err(JobError::Configuration(_))
		));

		assert!(validate_source_config(&council()).is_ok());
	}

	#[test]
	fn allowed_domains_default_to_start_url_hosts() {
		let config = council().parsed_config().unwrap();
		assert_eq!(
			allowed_domains(&config),
			vec!["council.example.org", "www.example.org"]
		);

		let explicit = SourceConfig {
			allowed_domains: vec!["example.org".into()],
			..config
		};
		assert_eq!(allowed_domains(&explicit), vec!["example.org"]);
	}

	#[tokio::test]
	async fn invocation_layout() {
		let h = Harness::new().await;
		let source = council();
		let config = validate_source_config(&source).unwrap();
		let job_id = JobId::new();

		let inv = h
			.orchestrator
			.build_invocation(&source, &config, job_id, "website_spider");

		assert_eq!(inv.program, "scrapy");
		assert_eq!(
			inv.args[..12],
			[
				"crawl".to_string(),
				"website_spider".to_string(),
				"-a".to_string(),
				format!("source_id={}", source.id),
				"-a".to_string(),
				format!("job_id={job_id}"),
				"-s".to_string(),
				"DEPTH_LIMIT=2".to_string(),
				"-s".to_string(),
				"CLOSESPIDER_ITEMCOUNT=1000".to_string(),
				"-a".to_string(),
				"allowed_domains=council.example.org,www.example.org".to_string(),
			]
		);
		assert_eq!(inv.args[12], "-a");
		let config_arg = inv.args[13].strip_prefix("config=").unwrap();
		let forwarded: serde_json::Value = serde_json::from_str(config_arg).unwrap();
		assert_eq!(forwarded, source.config);
		assert_eq!(inv.log_name, format!("website_spider-{job_id}"));
	}

	#[tokio::test]
	async fn trigger_starts_worker_and_records_pid() {
		let h = Harness::new().await;
		let source = council();

		let job = h.orchestrator.trigger_crawl(&source, None).await.unwrap();

		assert_eq!(job.status, JobStatus::Running);
		assert_eq!(job.job_type, JobType::Ingest);
		let pid = job.process_id().unwrap();
		assert_eq!(
			job.timeline
				.iter()
				.map(|e| e.message.as_str())
				.collect::<Vec<_>>(),
			vec![
				CRAWL_JOB_CREATED.to_string(),
				format!("Spider started with PID {pid}")
			]
		);
		assert!(job.payload.log_path.is_some());
		assert_eq!(
			job.payload.get_str("source_id"),
			Some(source.id.to_string().as_str())
		);
		assert_eq!(job.payload.get_str("worker_name"), Some("website_spider"));
		assert_eq!(h.launcher.launched().len(), 1);
	}

	#[tokio::test]
	async fn empty_start_urls_creates_no_job() {
		let h = Harness::new().await;
		let source = Source::new("Empty", "website", json!({"start_urls": []}));

		let err = h.orchestrator.trigger_crawl(&source, None).await.unwrap_err();
		assert!(matches!(err, JobError::Configuration(_)));
		assert!(h.jobs.list_active(None).await.unwrap().is_empty());
		assert!(h
			.jobs
			.list_by_status(&[JobStatus::Failed])
			.await
			.unwrap()
			.is_empty());
		assert!(h.launcher.launched().is_empty());
	}

	#[tokio::test]
	async fn launch_failure_fails_the_job() {
		let h = Harness::new().await;
		h.launcher.fail_launches(true);

		let err = h.orchestrator.trigger_crawl(&council(), None).await.unwrap_err();
		assert!(matches!(err, JobError::Launch(_)));

		let failed = h.jobs.list_by_status(&[JobStatus::Failed]).await.unwrap();
		assert_eq!(failed.len(), 1);
		assert!(failed[0]
			.error
			.as_deref()
			.unwrap()
			.starts_with("Failed to launch spider"));
		assert_eq!(failed[0].process_id(), None);
	}

	/// Delegates to the repository but rejects every payload write.
	struct PayloadWritesFail(Arc<JobRepository>);

	#[async_trait]
	impl JobStore for PayloadWritesFail {
		async fn create(&self, job: &Job) -> harvest_server_db::Result<JobId> {
			self.0.create(job).await
		}

		async fn get(&self, id: JobId) -> harvest_server_db::Result<Option<Job>> {
			self.0.get(id).await
		}

		async fn list_by_status(&self, statuses: &[JobStatus]) -> harvest_server_db::Result<Vec<Job>> {
			self.0.list_by_status(statuses).await
		}

		async fn list_stale(&self, before: DateTime<Utc>) -> harvest_server_db::Result<Vec<Job>> {
			self.0.list_stale(before).await
		}

		async fn append_timeline_and_set_status(
			&self,
			id: JobId,
			status: JobStatus,
			message: &str,
			error: Option<String>,
		) -> harvest_server_db::Result<Job> {
			self.0.append_timeline_and_set_status(id, status, message, error).await
		}

		async fn update_payload(
			&self,
			_id: JobId,
			_update: PayloadUpdate,
		) -> harvest_server_db::Result<Job> {
			Err(DbError::Internal("disk I/O error".into()))
		}
	}

	#[tokio::test]
	async fn unrecorded_launch_fails_the_job_with_its_pid() {
		let h = Harness::new().await;
		let orchestrator = CrawlOrchestrator::new(
			Arc::new(PayloadWritesFail(h.jobs.clone())),
			h.sources.clone(),
			h.launcher.clone(),
			CrawlerSettings::default(),
		);

		let err = orchestrator.trigger_crawl(&council(), None).await.unwrap_err();
		assert!(matches!(err, JobError::Repository(_)));
		assert_eq!(h.launcher.launched().len(), 1);

		let failed = h.jobs.list_by_status(&[JobStatus::Failed]).await.unwrap();
		assert_eq!(failed.len(), 1);
		let message = &failed[0].timeline.last().unwrap().message;
		assert!(message.starts_with("Spider started with PID 4000"), "{message}");
		assert!(failed[0].error.as_deref().unwrap().contains("disk I/O error"));
	}

	#[tokio::test]
	async fn reuses_existing_pending_job() {
		let h = Harness::new().await;
		let source = council();
		let pending = Job::new(
			JobType::Ingest,
			JobPayload::new().with("requested_by", "ops"),
			"Retry #1 of job x",
		);
		h.jobs.create(&pending).await.unwrap();

		let job = h
			.orchestrator
			.trigger_crawl(&source, Some(pending.id))
			.await
			.unwrap();

		assert_eq!(job.id, pending.id);
		assert_eq!(job.status, JobStatus::Running);
		assert_eq!(job.payload.get_str("requested_by"), Some("ops"));
		assert_eq!(job.payload.get_str("worker_name"), Some("website_spider"));
		assert_eq!(h.jobs.list_active(None).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn bad_config_fails_existing_job() {
		let h = Harness::new().await;
		let source = Source::new("Empty", "website", json!({}));
		let pending = Job::new(JobType::Ingest, JobPayload::new(), "created");
		h.jobs.create(&pending).await.unwrap();

		let err = h
			.orchestrator
			.trigger_crawl(&source, Some(pending.id))
			.await
			.unwrap_err();
		assert!(matches!(err, JobError::Configuration(_)));

		let stored = h.jobs.get(pending.id).await.unwrap().unwrap();
		assert_eq!(stored.status, JobStatus::Failed);
		assert_eq!(stored.error.as_deref(), Some(err.to_string().as_str()));
	}

	#[tokio::test]
	async fn existing_job_must_be_pending() {
		let h = Harness::new().await;
		let job = h.orchestrator.trigger_crawl(&council(), None).await.unwrap();

		let err = h
			.orchestrator
			.trigger_crawl(&council(), Some(job.id))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			JobError::IllegalTransition(TransitionError::NotLaunchable(JobStatus::Running))
		));
		assert_eq!(h.launcher.launched().len(), 1);
	}

	#[tokio::test]
	async fn launch_pending_resolves_source_from_payload() {
		let h = Harness::new().await;
		let source = council();
		h.sources.create(&source).await.unwrap();
		let pending = Job::new(
			JobType::Ingest,
			JobPayload::new().with("source_id", source.id.to_string()),
			"created",
		);
		h.jobs.create(&pending).await.unwrap();

		let job = h.orchestrator.launch_pending(pending.id).await.unwrap();
		assert_eq!(job.id, pending.id);
		assert_eq!(job.status, JobStatus::Running);

		let orphan = Job::new(JobType::Ingest, JobPayload::new(), "created");
		h.jobs.create(&orphan).await.unwrap();
		let err = h.orchestrator.launch_pending(orphan.id).await.unwrap_err();
		assert!(matches!(err, JobError::Configuration(_)));
	}

	#[tokio::test]
	async fn trigger_by_id_requires_known_source() {
		let h = Harness::new().await;
		let err = h
			.orchestrator
			.trigger_crawl_by_id(SourceId::new())
			.await
			.unwrap_err();
		assert!(matches!(err, JobError::SourceNotFound(_)));

		let source = council();
		h.sources.create(&source).await.unwrap();
		let job = h.orchestrator.trigger_crawl_by_id(source.id).await.unwrap();
		assert_eq!(job.status, JobStatus::Running);
	}
}
