// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron-driven crawl triggering.

use chrono::{DateTime, Utc};
use harvest_jobs_core::{JobId, Source};
use harvest_server_crons::CronSchedule;
use harvest_server_db::SourceStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::orchestrator::CrawlOrchestrator;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerTickReport {
	pub evaluated: usize,
	pub triggered: Vec<JobId>,
	pub skipped_invalid: usize,
	pub failed: usize,
}

pub struct CrawlScheduler {
	sources: Arc<dyn SourceStore>,
	orchestrator: Arc<CrawlOrchestrator>,
	interval: Duration,
	timezone: String,
}

impl CrawlScheduler {
	pub fn new(
		sources: Arc<dyn SourceStore>,
		orchestrator: Arc<CrawlOrchestrator>,
		interval: Duration,
		timezone: impl Into<String>,
	) -> Self {
		Self {
			sources,
			orchestrator,
			interval,
			timezone: timezone.into(),
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	pub async fn tick(&self) -> Result<SchedulerTickReport> {
		self.tick_at(Utc::now()).await
	}

	/// Trigger every scheduled source whose next run falls in this check window.
	#[instrument(skip(self))]
	pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<SchedulerTickReport> {
		let mut report = SchedulerTickReport::default();
		let window = chrono::Duration::from_std(self.interval)
			.unwrap_or_else(|_| chrono::Duration::MAX);

		for source in self.sources.list_scheduled().await? {
			let Some(expression) = source.schedule_expression() else {
				continue;
			};
			report.evaluated += 1;

			let schedule = match CronSchedule::parse(expression, &self.timezone) {
				Ok(schedule) => schedule,
				Err(e) => {
					warn!(source_id = %source.id, schedule = expression, error = %e, "skipping source with invalid schedule");
					report.skipped_invalid += 1;
					continue;
				}
			};

			if !schedule.is_due(source.last_run, now, window) {
				continue;
			}

			match self.run_source(&source, now).await {
				Ok(job_id) => report.triggered.push(job_id),
				Err(e) => {
					warn!(source_id = %source.id, error = %e, "scheduled crawl failed");
					report.failed += 1;
				}
			}
		}

		Ok(report)
	}

	async fn run_source(&self, source: &Source, now: DateTime<Utc>) -> Result<JobId> {
		let job = self.orchestrator.trigger_crawl(source, None).await?;
		self.sources.set_last_run(source.id, now).await?;
		info!(source_id = %source.id, job_id = %job.id, "scheduled crawl triggered");
		Ok(job.id)
	}

	pub async fn run_once(&self) {
		match self.tick().await {
			Ok(report) if report.triggered.is_empty() && report.failed == 0 => {
				debug!(evaluated = report.evaluated, "schedule check complete");
			}
			Ok(report) => info!(
				evaluated = report.evaluated,
				triggered = report.triggered.len(),
				skipped_invalid = report.skipped_invalid,
				failed = report.failed,
				"schedule check complete"
			),
			Err(e) => warn!(error = %e, "schedule check failed"),
		}
	}
}
