// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring from [`ServerConfig`] to the supervisor's components.

use anyhow::Context;
use harvest_jobs_core::JobType;
use harvest_server_config::{CrawlerConfig, LauncherKind, MonitorConfig, ServerConfig};
use harvest_server_db::{JobRepository, SourceRepository};
use harvest_server_jobs::{
	CrawlOrchestrator, CrawlScheduler, CrawlService, CrawlerSettings, HealthChecker, JobMonitor,
	JobSupervisor, MonitorPolicy,
};
use harvest_server_process::{
	ContainerExecLauncher, DetachedProcessLauncher, SystemProcesses, WorkerLauncher,
};
use std::sync::Arc;
use std::time::Duration;

pub mod version;

pub fn monitor_policy(config: &MonitorConfig) -> MonitorPolicy {
	MonitorPolicy {
		timeouts: config
			.timeouts
			.iter()
			.map(|(job_type, secs)| (JobType::from(job_type.as_str()), Duration::from_secs(*secs)))
			.collect(),
		default_timeout: Duration::from_secs(config.default_timeout_secs),
		idle_threshold: Duration::from_secs(config.idle_threshold_secs),
		idle_cpu_percent: config.idle_cpu_percent,
		continuously_active: config
			.continuously_active
			.iter()
			.map(|job_type| JobType::from(job_type.as_str()))
			.collect(),
		cancel_grace: Duration::from_secs(config.cancel_grace_secs),
		cancel_poll: Duration::from_millis(config.cancel_poll_ms),
	}
}

pub fn crawler_settings(config: &CrawlerConfig) -> CrawlerSettings {
	CrawlerSettings {
		program: config.program.clone(),
		base_args: config.base_args.clone(),
		working_dir: config.working_dir.clone(),
		default_max_depth: config.default_max_depth,
		default_max_items: config.default_max_items,
	}
}

pub fn worker_launcher(config: &CrawlerConfig) -> anyhow::Result<Arc<dyn WorkerLauncher>> {
	let launcher: Arc<dyn WorkerLauncher> = match config.launcher {
		LauncherKind::Local => Arc::new(DetachedProcessLauncher::new(config.log_dir.clone())),
		LauncherKind::Container => {
			let container = config
				.container
				.clone()
				.context("container launcher selected without a container name")?;
			Arc::new(ContainerExecLauncher::new(
				config.docker_bin.clone(),
				container,
				config.log_dir.clone(),
			))
		}
	};
	Ok(launcher)
}

/// Every long-lived component, built once per process.
pub struct Harvest {
	pub service: CrawlService,
	pub health: Arc<HealthChecker>,
	/// `None` when scheduling is disabled
	pub scheduler: Option<Arc<CrawlScheduler>>,
}

impl Harvest {
	/// Open the database, apply migrations and wire the components.
	pub async fn connect(config: &ServerConfig) -> anyhow::Result<Self> {
		let pool = harvest_server_db::create_pool(&config.database.url)
			.await
			.with_context(|| format!("opening database {}", config.database.url))?;
		harvest_server_db::run_migrations(&pool)
			.await
			.context("running migrations")?;

		let jobs = Arc::new(JobRepository::new(pool.clone()));
		let sources = Arc::new(SourceRepository::new(pool));
		let processes = Arc::new(SystemProcesses::new());

		let monitor = Arc::new(JobMonitor::new(
			jobs.clone(),
			processes.clone(),
			processes,
			monitor_policy(&config.monitor),
		));
		let orchestrator = Arc::new(CrawlOrchestrator::new(
			jobs,
			sources.clone(),
			worker_launcher(&config.crawler)?,
			crawler_settings(&config.crawler),
		));

		let health = Arc::new(HealthChecker::new(
			monitor.clone(),
			Duration::from_secs(config.health.interval_secs),
			Duration::from_secs(config.health.stale_threshold_secs),
		));
		let scheduler = config.scheduler.enabled.then(|| {
			Arc::new(CrawlScheduler::new(
				sources,
				orchestrator.clone(),
				Duration::from_secs(config.scheduler.interval_secs),
				config.scheduler.timezone.clone(),
			))
		});

		Ok(Self {
			service: CrawlService::new(orchestrator, monitor),
			health,
			scheduler,
		})
	}

	/// A supervisor with the health loop and, if enabled, the scheduler loop registered.
	pub fn supervisor(&self) -> JobSupervisor {
		let mut supervisor = JobSupervisor::new();
		supervisor.register(self.health.clone());
		if let Some(scheduler) = &self.scheduler {
			supervisor.register(scheduler.clone());
		}
		supervisor
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use harvest_server_config::CrawlerConfigLayer;

	fn config_in(dir: &tempfile::TempDir) -> ServerConfig {
		let mut config = ServerConfig::default();
		config.database.url = format!("sqlite:{}", dir.path().join("harvest.db").display());
		config.crawler.log_dir = dir.path().join("logs");
		config
	}

	#[test]
	fn policy_from_config() {
		let mut config = MonitorConfig::default();
		config.timeouts.insert("reindex".to_string(), 90);
		config.continuously_active = vec!["ingest".to_string()];
		config.cancel_grace_secs = 2;

		let policy = monitor_policy(&config);
		assert_eq!(
			policy.timeout_for(&JobType::Other("reindex".into())),
			Duration::from_secs(90)
		);
		assert_eq!(policy.timeout_for(&JobType::Evaluate), Duration::from_secs(300));
		assert!(policy.continuously_active.contains(&JobType::Ingest));
		assert!(!policy.continuously_active.contains(&JobType::Evaluate));
		assert_eq!(policy.cancel_grace, Duration::from_secs(2));
	}

	#[test]
	fn settings_from_config() {
		let layer = CrawlerConfigLayer {
			program: Some("/opt/crawlers/bin/scrapy".to_string()),
			default_max_depth: Some(5),
			..Default::default()
		};
		let settings = crawler_settings(&layer.finalize());
		assert_eq!(settings.program, "/opt/crawlers/bin/scrapy");
		assert_eq!(settings.base_args, vec!["crawl".to_string()]);
		assert_eq!(settings.default_max_depth, 5);
	}

	#[test]
	fn container_launcher_needs_a_name() {
		let config = CrawlerConfig {
			launcher: LauncherKind::Container,
			container: None,
			..Default::default()
		};
		assert!(worker_launcher(&config).is_err());

		let config = CrawlerConfig {
			container: Some("crawler".to_string()),
			..config
		};
		assert!(worker_launcher(&config).is_ok());
	}

	#[tokio::test]
	async fn connect_registers_both_loops() {
		let dir = tempfile::tempdir().unwrap();
		let harvest = Harvest::connect(&config_in(&dir)).await.unwrap();

		assert!(harvest.service.list_active_jobs().await.unwrap().is_empty());
		assert_eq!(
			harvest.supervisor().task_names(),
			vec!["health-checker", "crawl-scheduler"]
		);
	}

	#[tokio::test]
	async fn disabled_scheduler_is_not_registered() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = config_in(&dir);
		config.scheduler.enabled = false;

		let harvest = Harvest::connect(&config).await.unwrap();
		assert!(harvest.scheduler.is_none());
		assert_eq!(harvest.supervisor().task_names(), vec!["health-checker"]);
	}
}
