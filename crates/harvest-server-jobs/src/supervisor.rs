// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs the background loops until shutdown.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::checker::HealthChecker;
use crate::scheduler::CrawlScheduler;

/// A loop body run on a fixed interval.
///
/// `run_once` must log its own failures; the supervisor only guards
/// against panics.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
	fn name(&self) -> &'static str;
	fn interval(&self) -> Duration;
	async fn run_once(&self);
}

#[async_trait]
impl PeriodicTask for HealthChecker {
	fn name(&self) -> &'static str {
		"health-checker"
	}

	fn interval(&self) -> Duration {
		HealthChecker::interval(self)
	}

	async fn run_once(&self) {
		HealthChecker::run_once(self).await
	}
}

#[async_trait]
impl PeriodicTask for CrawlScheduler {
	fn name(&self) -> &'static str {
		"crawl-scheduler"
	}

	fn interval(&self) -> Duration {
		CrawlScheduler::interval(self)
	}

	async fn run_once(&self) {
		CrawlScheduler::run_once(self).await
	}
}

pub struct JobSupervisor {
	tasks: Vec<Arc<dyn PeriodicTask>>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for JobSupervisor {
	fn default() -> Self {
		Self::new()
	}
}

impl JobSupervisor {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			tasks: Vec::new(),
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register(&mut self, task: Arc<dyn PeriodicTask>) {
		self.tasks.push(task);
	}

	pub fn task_names(&self) -> Vec<&'static str> {
		self.tasks.iter().map(|t| t.name()).collect()
	}

	/// Spawn one loop per registered task. Each sleeps first, then ticks.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		let mut handles = self.handles.lock().await;

		for task in &self.tasks {
			let task = Arc::clone(task);
			let mut shutdown_rx = self.shutdown_tx.subscribe();

			let handle = tokio::spawn(async move {
				let name = task.name();
				let interval = task.interval();
				info!(task = name, interval_secs = interval.as_secs(), "loop started");
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							if AssertUnwindSafe(task.run_once()).catch_unwind().await.is_err() {
								error!(task = name, "tick panicked");
							}
						}
						_ = shutdown_rx.recv() => {
							info!(task = name, "loop shutting down");
							break;
						}
					}
				}
			});

			handles.push(handle);
		}

		info!(task_count = handles.len(), "job supervisor started");
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("job supervisor shut down");
	}
}
