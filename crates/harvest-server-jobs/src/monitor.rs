// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hang diagnosis, cancellation and retry.
//!
//! [`JobMonitor::diagnose`] is pure: it takes the job, a process reading and
//! `now`, and decides. Everything that touches the store or the process
//! table goes through the async methods.

use chrono::{DateTime, Utc};
use harvest_jobs_core::{Job, JobId, JobStatus, TransitionError};
use harvest_server_db::JobStore;
use harvest_server_process::{ProcessInfo, ProcessInspector, ProcessSignaller};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::error::{JobError, Result};
use crate::policy::MonitorPolicy;

pub const NO_PROCESS_ASSOCIATED: &str = "no process associated";
pub const PROCESS_NOT_FOUND: &str = "process not found";
pub const TERMINATED_GRACEFULLY: &str = "terminated gracefully";
pub const FORCE_KILLED: &str = "force killed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HangReason {
	Timeout { limit_secs: u64, runtime_secs: i64 },
	Idle { idle_secs: i64 },
}

impl fmt::Display for HangReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Timeout {
				limit_secs,
				runtime_secs,
			} => write!(
				f,
				"exceeded timeout of {limit_secs}s (runtime {runtime_secs}s)"
			),
			Self::Idle { idle_secs } => {
				write!(f, "idle for {idle_secs}s with no timeline update")
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Diagnosis {
	Healthy,
	Hanging { reason: HangReason },
	/// The process is gone; left to the stale sweep
	ProcessNotRunning,
	/// Not `running`, or no process recorded
	NotApplicable,
}

/// Point-in-time view of one job and its worker.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
	pub job: Job,
	pub process: Option<ProcessInfo>,
	pub diagnosis: Diagnosis,
	pub seconds_since_update: i64,
}

pub struct JobMonitor {
	jobs: Arc<dyn JobStore>,
	inspector: Arc<dyn ProcessInspector>,
	signaller: Arc<dyn ProcessSignaller>,
	policy: MonitorPolicy,
}

impl JobMonitor {
	pub fn new(
		jobs: Arc<dyn JobStore>,
		inspector: Arc<dyn ProcessInspector>,
		signaller: Arc<dyn ProcessSignaller>,
		policy: MonitorPolicy,
	) -> Self {
		Self {
			jobs,
			inspector,
			signaller,
			policy,
		}
	}

	pub fn policy(&self) -> &MonitorPolicy {
		&self.policy
	}

	pub fn jobs(&self) -> &Arc<dyn JobStore> {
		&self.jobs
	}

	pub async fn inspect(&self, pid: u32) -> ProcessInfo {
		self.inspector.inspect(pid).await
	}

	pub fn diagnose(&self, job: &Job, process: Option<&ProcessInfo>, now: DateTime<Utc>) -> Diagnosis {
		if job.status != JobStatus::Running || job.process_id().is_none() {
			return Diagnosis::NotApplicable;
		}
		let Some(process) = process.filter(|p| p.is_running()) else {
			return Diagnosis::ProcessNotRunning;
		};

		let runtime_secs = (now - job.created_at).num_seconds();
		let limit_secs = self.policy.timeout_for(&job.job_type).as_secs();
		if runtime_secs > saturating_secs(limit_secs) {
			return Diagnosis::Hanging {
				reason: HangReason::Timeout {
					limit_secs,
					runtime_secs,
				},
			};
		}

		let idle_secs = (now - job.last_update()).num_seconds();
		if process.cpu_percent < self.policy.idle_cpu_percent
			&& self.policy.continuously_active.contains(&job.job_type)
			&& idle_secs > saturating_secs(self.policy.idle_threshold.as_secs())
		{
			return Diagnosis::Hanging {
				reason: HangReason::Idle { idle_secs },
			};
		}

		Diagnosis::Healthy
	}

	/// Inspect a running job's worker and record a hang if one is found.
	#[instrument(skip(self, job), fields(job_id = %job.id))]
	pub async fn check_job(&self, job: &Job, now: DateTime<Utc>) -> Result<Diagnosis> {
		let Some(pid) = job.process_id().filter(|_| job.status == JobStatus::Running) else {
			return Ok(Diagnosis::NotApplicable);
		};

		let process = self.inspector.inspect(pid).await;
		let diagnosis = self.diagnose(job, Some(&process), now);

		if let Diagnosis::Hanging { reason } = &diagnosis {
			let reason = reason.to_string();
			self
				.jobs
				.append_timeline_and_set_status(
					job.id,
					JobStatus::Hanging,
					&format!("Job appears to be hanging: {reason}"),
					Some(reason.clone()),
				)
				.await?;
			warn!(pid, reason = %reason, "job marked hanging");
		}

		Ok(diagnosis)
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, id: JobId) -> Result<JobStatusReport> {
		let job = self.get(id).await?;
		let now = Utc::now();
		let process = match job.process_id() {
			Some(pid) => Some(self.inspector.inspect(pid).await),
			None => None,
		};
		let diagnosis = self.diagnose(&job, process.as_ref(), now);
		let seconds_since_update = (now - job.last_update()).num_seconds();

		Ok(JobStatusReport {
			job,
			process,
			diagnosis,
			seconds_since_update,
		})
	}

	/// Stop the job's worker, if any, and mark the job cancelled.
	///
	/// The job ends up cancelled whether or not the process could be signalled.
	#[instrument(skip(self))]
	pub async fn cancel(&self, id: JobId, force: bool) -> Result<Job> {
		let job = self.get(id).await?;
		if !job.status.can_cancel() {
			return Err(TransitionError::NotCancellable(job.status).into());
		}

		let message = match job.process_id() {
			None => NO_PROCESS_ASSOCIATED,
			Some(pid) => self.stop_process(pid, force).await,
		};

		let job = self
			.jobs
			.append_timeline_and_set_status(id, JobStatus::Cancelled, message, None)
			.await?;
		info!(outcome = message, "job cancelled");
		Ok(job)
	}

	async fn stop_process(&self, pid: u32, force: bool) -> &'static str {
		if force {
			return match self.signaller.kill(pid).await {
				Ok(false) => PROCESS_NOT_FOUND,
				Ok(true) => FORCE_KILLED,
				Err(e) => {
					warn!(pid, error = %e, "failed to kill worker");
					FORCE_KILLED
				}
			};
		}

		match self.signaller.terminate(pid).await {
			Ok(false) => return PROCESS_NOT_FOUND,
			Ok(true) => {}
			Err(e) => warn!(pid, error = %e, "failed to terminate worker, escalating"),
		}

		let deadline = Instant::now() + self.policy.cancel_grace;
		while Instant::now() < deadline {
			if !self.inspector.inspect(pid).await.is_running() {
				return TERMINATED_GRACEFULLY;
			}
			tokio::time::sleep(self.policy.cancel_poll).await;
		}

		match self.signaller.kill(pid).await {
			Ok(false) => TERMINATED_GRACEFULLY,
			Ok(true) => FORCE_KILLED,
			Err(e) => {
				warn!(pid, error = %e, "failed to kill worker");
				FORCE_KILLED
			}
		}
	}

	/// Create a fresh `pending` sibling of a failed or cancelled job.
	#[instrument(skip(self))]
	pub async fn retry(&self, id: JobId) -> Result<Job> {
		let original = self.get(id).await?;
		let retry = original.retry_of(Utc::now())?;
		self.jobs.create(&retry).await?;
		info!(retry_id = %retry.id, retries = retry.retries, "job retried");
		Ok(retry)
	}

	pub async fn list_active(&self) -> Result<Vec<Job>> {
		Ok(self.jobs.list_active(None).await?)
	}

	async fn get(&self, id: JobId) -> Result<Job> {
		self
			.jobs
			.get(id)
			.await?
			.ok_or_else(|| JobError::NotFound(id.to_string()))
	}
}

fn saturating_secs(secs: u64) -> i64 {
	i64::try_from(secs).unwrap_or(i64::MAX)
}
