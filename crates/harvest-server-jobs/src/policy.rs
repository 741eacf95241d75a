// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunables for diagnosis, cancellation and crawl launching.

use harvest_jobs_core::JobType;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MonitorPolicy {
	/// Maximum runtime per job type
	pub timeouts: HashMap<JobType, Duration>,
	/// Applies to types missing from `timeouts`
	pub default_timeout: Duration,
	/// Silence in the timeline after which a low-CPU job counts as idle
	pub idle_threshold: Duration,
	pub idle_cpu_percent: f32,
	/// Types expected to write progress steadily; only these can be idle
	pub continuously_active: HashSet<JobType>,
	/// How long a SIGTERMed worker gets before SIGKILL
	pub cancel_grace: Duration,
	pub cancel_poll: Duration,
}

impl Default for MonitorPolicy {
	fn default() -> Self {
		Self {
			timeouts: HashMap::from([
				(JobType::Ingest, Duration::from_secs(3600)),
				(JobType::Normalize, Duration::from_secs(600)),
				(JobType::Evaluate, Duration::from_secs(300)),
				(JobType::Export, Duration::from_secs(1800)),
			]),
			default_timeout: Duration::from_secs(1800),
			idle_threshold: Duration::from_secs(300),
			idle_cpu_percent: 1.0,
			continuously_active: HashSet::from([
				JobType::Ingest,
				JobType::Normalize,
				JobType::Evaluate,
			]),
			cancel_grace: Duration::from_secs(5),
			cancel_poll: Duration::from_millis(200),
		}
	}
}

impl MonitorPolicy {
	pub fn timeout_for(&self, job_type: &JobType) -> Duration {
		self
			.timeouts
			.get(job_type)
			.copied()
			.unwrap_or(self.default_timeout)
	}
}

/// How crawl workers are invoked.
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
	pub program: String,
	/// Arguments placed before the worker name
	pub base_args: Vec<String>,
	pub working_dir: Option<PathBuf>,
	pub default_max_depth: u32,
	pub default_max_items: u64,
}

impl Default for CrawlerSettings {
	fn default() -> Self {
		Self {
			program: "scrapy".to_string(),
			base_args: vec!["crawl".to_string()],
			working_dir: None,
			default_max_depth: 3,
			default_max_items: 1000,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_types_use_default_timeout() {
		let policy = MonitorPolicy::default();
		assert_eq!(policy.timeout_for(&JobType::Evaluate), Duration::from_secs(300));
		assert_eq!(
			policy.timeout_for(&JobType::Other("reindex".into())),
			Duration::from_secs(1800)
		);
	}
}
