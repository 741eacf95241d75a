// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic health pass over active jobs, plus the stale sweep.

use chrono::{DateTime, Utc};
use harvest_jobs_core::{Job, JobId, JobStatus};
use harvest_server_process::ProcessState;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{JobError, Result};
use crate::monitor::{Diagnosis, JobMonitor, PROCESS_NOT_FOUND};

pub const PROCESS_DIED: &str = "process died without updating status";

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthTickReport {
	pub checked: usize,
	pub newly_hanging: Vec<JobId>,
	pub stale_failed: Vec<JobId>,
	pub errors: usize,
}

impl HealthTickReport {
	pub fn is_empty(&self) -> bool {
		self.newly_hanging.is_empty() && self.stale_failed.is_empty() && self.errors == 0
	}
}

pub struct HealthChecker {
	monitor: Arc<JobMonitor>,
	interval: Duration,
	stale_threshold: Duration,
}

impl HealthChecker {
	pub fn new(monitor: Arc<JobMonitor>, interval: Duration, stale_threshold: Duration) -> Self {
		Self {
			monitor,
			interval,
			stale_threshold,
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	pub async fn tick(&self) -> Result<HealthTickReport> {
		self.tick_at(Utc::now()).await
	}

	/// One pass: diagnose every running job, then fail stale ones whose process is gone.
	///
	/// Per-job failures are counted and logged; only a failure to list jobs aborts the tick.
	#[instrument(skip(self))]
	pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<HealthTickReport> {
		let mut report = HealthTickReport::default();

		let active = self
			.monitor
			.jobs()
			.list_by_status(&[JobStatus::Pending, JobStatus::Running])
			.await?;

		for job in active
			.iter()
			.filter(|j| j.status == JobStatus::Running && j.process_id().is_some())
		{
			report.checked += 1;
			match self.monitor.check_job(job, now).await {
				Ok(Diagnosis::Hanging { .. }) => report.newly_hanging.push(job.id),
				Ok(_) => {}
				Err(e) if e.is_superseded() => {
					debug!(job_id = %job.id, error = %e, "job changed during health check");
				}
				Err(e) => {
					warn!(job_id = %job.id, error = %e, "health check failed for job");
					report.errors += 1;
				}
			}
		}

		self.sweep_stale(now, &mut report).await?;
		Ok(report)
	}

	async fn sweep_stale(&self, now: DateTime<Utc>, report: &mut HealthTickReport) -> Result<()> {
		let threshold = chrono::Duration::from_std(self.stale_threshold)
			.unwrap_or_else(|_| chrono::Duration::MAX);
		let cutoff = now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC);

		for job in self.monitor.jobs().list_stale(cutoff).await? {
			let Some(reason) = self.stale_reason(&job).await else {
				continue;
			};

			match self
				.monitor
				.jobs()
				.append_timeline_and_set_status(
					job.id,
					JobStatus::Failed,
					reason,
					Some(reason.to_string()),
				)
				.await
			{
				Ok(_) => {
					warn!(job_id = %job.id, reason, "stale job failed");
					report.stale_failed.push(job.id);
				}
				Err(e) => {
					let e = JobError::from(e);
					if e.is_superseded() {
						debug!(job_id = %job.id, error = %e, "stale job changed during sweep");
					} else {
						warn!(job_id = %job.id, error = %e, "failed to mark stale job");
						report.errors += 1;
					}
				}
			}
		}

		Ok(())
	}

	async fn stale_reason(&self, job: &Job) -> Option<&'static str> {
		let Some(pid) = job.process_id() else {
			return Some(PROCESS_NOT_FOUND);
		};

		match self.monitor.inspect(pid).await.state {
			ProcessState::NotFound => Some(PROCESS_NOT_FOUND),
			ProcessState::Dead => Some(PROCESS_DIED),
			ProcessState::Running | ProcessState::AccessDenied => None,
		}
	}

	/// Run a tick and log the outcome. Errors never escape.
	pub async fn run_once(&self) {
		match self.tick().await {
			Ok(report) if report.is_empty() => {
				debug!(checked = report.checked, "health check complete");
			}
			Ok(report) => info!(
				checked = report.checked,
				newly_hanging = report.newly_hanging.len(),
				stale_failed = report.stale_failed.len(),
				errors = report.errors,
				"health check complete"
			),
			Err(e) => warn!(error = %e, "health check tick failed"),
		}
	}
}
