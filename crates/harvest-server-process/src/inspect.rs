// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness and resource readings for worker pids.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid as SysPid, ProcessStatus, ProcessesToUpdate, System};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
	Running,
	NotFound,
	/// Exited or zombie, but still in the process table
	Dead,
	/// Exists but belongs to someone we cannot inspect
	AccessDenied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
	pub pid: u32,
	pub state: ProcessState,
	pub cpu_percent: f32,
	pub memory_mb: f64,
	pub runtime_seconds: u64,
	pub thread_count: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ProcessInfo {
	pub fn new(pid: u32, state: ProcessState) -> Self {
		Self {
			pid,
			state,
			cpu_percent: 0.0,
			memory_mb: 0.0,
			runtime_seconds: 0,
			thread_count: 0,
			error: None,
		}
	}

	pub fn not_found(pid: u32) -> Self {
		Self::new(pid, ProcessState::NotFound)
	}

	/// `AccessDenied` counts as running: we cannot prove it is gone.
	pub fn is_running(&self) -> bool {
		matches!(self.state, ProcessState::Running | ProcessState::AccessDenied)
	}
}

#[async_trait]
pub trait ProcessInspector: Send + Sync {
	/// Never fails; a missing pid is reported as [`ProcessState::NotFound`].
	async fn inspect(&self, pid: u32) -> ProcessInfo;
}

#[async_trait]
pub trait ProcessSignaller: Send + Sync {
	/// Send SIGTERM. Returns `false` if there was no such process.
	async fn terminate(&self, pid: u32) -> Result<bool>;

	/// Send SIGKILL. Returns `false` if there was no such process.
	async fn kill(&self, pid: u32) -> Result<bool>;
}

/// The local process table, read through `kill(pid, 0)` and `sysinfo`.
#[derive(Debug, Clone)]
pub struct SystemProcesses {
	sample_cpu: bool,
}

impl Default for SystemProcesses {
	fn default() -> Self {
		Self::new()
	}
}

impl SystemProcesses {
	pub fn new() -> Self {
		Self { sample_cpu: true }
	}

	/// Skip the second CPU sample. `cpu_percent` will read 0.
	pub fn without_cpu_sampling() -> Self {
		Self { sample_cpu: false }
	}
}

/// pid 0 and anything that does not fit a `pid_t` would address process
/// groups or wrap, so they are never passed to the kernel.
fn addressable(pid: u32) -> bool {
	pid != 0 && i32::try_from(pid).is_ok()
}

#[derive(Debug)]
enum Probe {
	Exists,
	Denied,
	Missing,
	Failed(String),
}

#[cfg(unix)]
fn probe(pid: u32) -> Probe {
	use nix::errno::Errno;
	use nix::sys::signal::{kill, Signal};
	use nix::unistd::Pid;

	match kill(Pid::from_raw(pid as i32), None::<Signal>) {
		Ok(()) => Probe::Exists,
		Err(Errno::EPERM) => Probe::Denied,
		Err(Errno::ESRCH) => Probe::Missing,
		Err(err) => Probe::Failed(err.to_string()),
	}
}

#[cfg(not(unix))]
fn probe(pid: u32) -> Probe {
	let mut system = System::new();
	system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
	if system.process(SysPid::from_u32(pid)).is_some() {
		Probe::Exists
	} else {
		Probe::Missing
	}
}

#[cfg_attr(not(target_os = "linux"), allow(unused_variables))]
fn thread_count(process: &sysinfo::Process, pid: u32) -> u32 {
	#[cfg(target_os = "linux")]
	if let Ok(entries) = std::fs::read_dir(format!("/proc/{pid}/task")) {
		return entries.count() as u32;
	}

	process
		.tasks()
		.map(|tasks| tasks.len() as u32)
		.filter(|n| *n > 0)
		.unwrap_or(1)
}

#[async_trait]
impl ProcessInspector for SystemProcesses {
	#[tracing::instrument(skip(self))]
	async fn inspect(&self, pid: u32) -> ProcessInfo {
		if !addressable(pid) {
			return ProcessInfo::not_found(pid);
		}

		let mut error = None;
		let probed_state = match probe(pid) {
			Probe::Missing => return ProcessInfo::not_found(pid),
			Probe::Denied => ProcessState::AccessDenied,
			Probe::Exists => ProcessState::Running,
			Probe::Failed(message) => {
				tracing::warn!(pid, error = %message, "process probe failed, assuming alive");
				error = Some(message);
				ProcessState::Running
			}
		};

		let sys_pid = SysPid::from_u32(pid);
		let mut system = System::new();
		system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
		if self.sample_cpu {
			tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
			system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
		}

		let Some(process) = system.process(sys_pid) else {
			// Gone between the probe and the table read, unless we simply may not see it.
			let mut info = match probed_state {
				ProcessState::AccessDenied => ProcessInfo::new(pid, ProcessState::AccessDenied),
				_ => ProcessInfo::not_found(pid),
			};
			info.error = error;
			return info;
		};

		let state = match process.status() {
			ProcessStatus::Zombie | ProcessStatus::Dead => ProcessState::Dead,
			_ => probed_state,
		};

		ProcessInfo {
			pid,
			state,
			cpu_percent: process.cpu_usage(),
			memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
			runtime_seconds: process.run_time(),
			thread_count: thread_count(process, pid),
			error,
		}
	}
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<bool> {
	use nix::errno::Errno;
	use nix::sys::signal::kill;
	use nix::unistd::Pid;

	use crate::error::ProcessError;

	if !addressable(pid) {
		return Ok(false);
	}

	// Workers run as process-group leaders; signal the group so their children go too.
	let group = Pid::from_raw(-(pid as i32));
	if kill(group, signal).is_ok() {
		return Ok(true);
	}

	match kill(Pid::from_raw(pid as i32), signal) {
		Ok(()) => Ok(true),
		Err(Errno::ESRCH) => Ok(false),
		Err(err) => Err(ProcessError::Signal {
			pid,
			message: format!("{signal:?}: {err}"),
		}),
	}
}

#[cfg(not(unix))]
fn send_signal_sysinfo(pid: u32, signal: sysinfo::Signal) -> Result<bool> {
	let sys_pid = SysPid::from_u32(pid);
	let mut system = System::new();
	system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
	match system.process(sys_pid) {
		Some(process) => Ok(process
			.kill_with(signal)
			.unwrap_or_else(|| process.kill())),
		None => Ok(false),
	}
}

#[async_trait]
impl ProcessSignaller for SystemProcesses {
	#[tracing::instrument(skip(self))]
	async fn terminate(&self, pid: u32) -> Result<bool> {
		#[cfg(unix)]
		{
			send_signal(pid, nix::sys::signal::Signal::SIGTERM)
		}
		#[cfg(not(unix))]
		{
			send_signal_sysinfo(pid, sysinfo::Signal::Term)
		}
	}

	#[tracing::instrument(skip(self))]
	async fn kill(&self, pid: u32) -> Result<bool> {
		#[cfg(unix)]
		{
			send_signal(pid, nix::sys::signal::Signal::SIGKILL)
		}
		#[cfg(not(unix))]
		{
			send_signal_sysinfo(pid, sysinfo::Signal::Kill)
		}
	}
}
