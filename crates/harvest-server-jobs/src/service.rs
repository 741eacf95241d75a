// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operations exposed to callers (the CLI, or an API layer in front of it).

use harvest_jobs_core::{Job, JobId, SourceId};
use std::sync::Arc;

use crate::error::Result;
use crate::monitor::{JobMonitor, JobStatusReport};
use crate::orchestrator::CrawlOrchestrator;

#[derive(Clone)]
pub struct CrawlService {
	orchestrator: Arc<CrawlOrchestrator>,
	monitor: Arc<JobMonitor>,
}

impl CrawlService {
	pub fn new(orchestrator: Arc<CrawlOrchestrator>, monitor: Arc<JobMonitor>) -> Self {
		Self {
			orchestrator,
			monitor,
		}
	}

	pub async fn trigger_crawl(&self, source_id: SourceId) -> Result<Job> {
		self.orchestrator.trigger_crawl_by_id(source_id).await
	}

	pub async fn get_job_status(&self, job_id: JobId) -> Result<JobStatusReport> {
		self.monitor.job_status(job_id).await
	}

	pub async fn cancel_job(&self, job_id: JobId, force: bool) -> Result<Job> {
		self.monitor.cancel(job_id, force).await
	}

	/// Create the retry job. It stays `pending` until [`Self::relaunch_job`].
	pub async fn retry_job(&self, job_id: JobId) -> Result<Job> {
		self.monitor.retry(job_id).await
	}

	/// Start the worker for a pending crawl job.
	pub async fn relaunch_job(&self, job_id: JobId) -> Result<Job> {
		self.orchestrator.launch_pending(job_id).await
	}

	pub async fn list_active_jobs(&self) -> Result<Vec<Job>> {
		self.monitor.list_active().await
	}
}
