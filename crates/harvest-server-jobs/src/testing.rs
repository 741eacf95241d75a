// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory stand-ins for the OS-facing traits.

use async_trait::async_trait;
use harvest_server_db::testing::{create_file_test_pool, create_test_pool};
use sqlx::SqlitePool;
use harvest_server_db::{JobRepository, SourceRepository};
use harvest_server_process::{
	LaunchedWorker, ProcessError, ProcessInfo, ProcessInspector, ProcessSignaller, ProcessState,
	WorkerInvocation, WorkerLauncher,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::monitor::JobMonitor;
use crate::orchestrator::CrawlOrchestrator;
use crate::policy::{CrawlerSettings, MonitorPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
	Term,
	Kill,
}

/// A process table the test controls.
#[derive(Default)]
pub struct FakeProcesses {
	table: Mutex<HashMap<u32, ProcessInfo>>,
	/// pids that ignore SIGTERM
	stubborn: Mutex<HashSet<u32>>,
	signals: Mutex<Vec<(u32, Signal)>>,
}

impl FakeProcesses {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn set(&self, pid: u32, state: ProcessState, cpu_percent: f32) {
		let mut info = ProcessInfo::new(pid, state);
		info.cpu_percent = cpu_percent;
		info.thread_count = 1;
		self.table.lock().unwrap().insert(pid, info);
	}

	pub fn ignore_sigterm(&self, pid: u32) {
		self.stubborn.lock().unwrap().insert(pid);
	}

	pub fn signals(&self) -> Vec<(u32, Signal)> {
		self.signals.lock().unwrap().clone()
	}
}

#[async_trait]
impl ProcessInspector for FakeProcesses {
	async fn inspect(&self, pid: u32) -> ProcessInfo {
		self
			.table
			.lock()
			.unwrap()
			.get(&pid)
			.cloned()
			.unwrap_or_else(|| ProcessInfo::not_found(pid))
	}
}

#[async_trait]
impl ProcessSignaller for FakeProcesses {
	async fn terminate(&self, pid: u32) -> harvest_server_process::Result<bool> {
		self.signals.lock().unwrap().push((pid, Signal::Term));
		let mut table = self.table.lock().unwrap();
		if !table.contains_key(&pid) {
			return Ok(false);
		}
		if !self.stubborn.lock().unwrap().contains(&pid) {
			table.remove(&pid);
		}
		Ok(true)
	}

	async fn kill(&self, pid: u32) -> harvest_server_process::Result<bool> {
		self.signals.lock().unwrap().push((pid, Signal::Kill));
		Ok(self.table.lock().unwrap().remove(&pid).is_some())
	}
}

/// Hands out sequential pids and registers them as running.
pub struct FakeLauncher {
	next_pid: AtomicU32,
	fail: AtomicBool,
	processes: Arc<FakeProcesses>,
	launched: Mutex<Vec<WorkerInvocation>>,
}

impl FakeLauncher {
	pub fn new(processes: Arc<FakeProcesses>) -> Arc<Self> {
		Arc::new(Self {
			next_pid: AtomicU32::new(4000),
			fail: AtomicBool::new(false),
			processes,
			launched: Mutex::new(Vec::new()),
		})
	}

	pub fn fail_launches(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}

	pub fn launched(&self) -> Vec<WorkerInvocation> {
		self.launched.lock().unwrap().clone()
	}
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
	async fn launch(
		&self,
		invocation: &WorkerInvocation,
	) -> harvest_server_process::Result<LaunchedWorker> {
		self.launched.lock().unwrap().push(invocation.clone());
		if self.fail.load(Ordering::SeqCst) {
			return Err(ProcessError::Spawn {
				program: invocation.program.clone(),
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
			});
		}

		let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
		self.processes.set(pid, ProcessState::Running, 25.0);
		Ok(LaunchedWorker {
			pid,
			log_path: Some(format!("/tmp/harvest/{}.log", invocation.log_name)),
		})
	}
}

/// Everything wired against an in-memory database and fake processes.
pub struct Harness {
	pub jobs: Arc<JobRepository>,
	pub sources: Arc<SourceRepository>,
	pub processes: Arc<FakeProcesses>,
	pub launcher: Arc<FakeLauncher>,
	pub monitor: Arc<JobMonitor>,
	pub orchestrator: Arc<CrawlOrchestrator>,
}

pub fn quick_policy() -> MonitorPolicy {
	MonitorPolicy {
		cancel_grace: Duration::from_millis(60),
		cancel_poll: Duration::from_millis(10),
		..MonitorPolicy::default()
	}
}

impl Harness {
	pub async fn new() -> Self {
		Self::with_policy(quick_policy()).await
	}

	pub async fn with_policy(policy: MonitorPolicy) -> Self {
		Self::with_pool(create_test_pool().await, policy)
	}

	/// Backed by a database file, so concurrent writers get their own connections.
	pub async fn file_backed(path: &Path) -> Self {
		Self::with_pool(create_file_test_pool(path).await, quick_policy())
	}

	fn with_pool(pool: SqlitePool, policy: MonitorPolicy) -> Self {
		let jobs = Arc::new(JobRepository::new(pool.clone()));
		let sources = Arc::new(SourceRepository::new(pool));
		let processes = FakeProcesses::new();
		let launcher = FakeLauncher::new(Arc::clone(&processes));

		let monitor = Arc::new(JobMonitor::new(
			jobs.clone(),
			processes.clone(),
			processes.clone(),
			policy,
		));
		let orchestrator = Arc::new(CrawlOrchestrator::new(
			jobs.clone(),
			sources.clone(),
			launcher.clone(),
			CrawlerSettings::default(),
		));

		Self {
			jobs,
			sources,
			processes,
			launcher,
			monitor,
			orchestrator,
		}
	}
}
