// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Detached worker launchers.
//!
//! Launching is spawn-and-forget from the caller's point of view: the
//! launcher returns as soon as the worker has a pid. Everything after that
//! is observed through the process inspector and the job timeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{ProcessError, Result};

/// Everything needed to start one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInvocation {
	pub program: String,
	pub args: Vec<String>,
	#[serde(default)]
	pub env: Vec<(String, String)>,
	#[serde(default)]
	pub working_dir: Option<PathBuf>,
	/// File stem for the worker's log, unique per job
	pub log_name: String,
}

impl WorkerInvocation {
	/// Program and arguments as one shell-safe command line.
	pub fn command_line(&self) -> String {
		std::iter::once(self.program.as_str())
			.chain(self.args.iter().map(String::as_str))
			.map(shell_quote)
			.collect::<Vec<_>>()
			.join(" ")
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchedWorker {
	pub pid: u32,
	pub log_path: Option<String>,
}

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
	async fn launch(&self, invocation: &WorkerInvocation) -> Result<LaunchedWorker>;
}

/// Quote `value` for POSIX `sh`, leaving plain words untouched.
pub(crate) fn shell_quote(value: &str) -> String {
	let plain = !value.is_empty()
		&& value
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || "_-./=:,@%+".contains(c));
	if plain {
		value.to_string()
	} else {
		format!("'{}'", value.replace('\'', r"'\''"))
	}
}

/// Starts workers as children of this process, in their own process group,
/// with stdout and stderr appended to `<log_dir>/<log_name>.log`.
#[derive(Debug, Clone)]
pub struct DetachedProcessLauncher {
	log_dir: PathBuf,
}

impl DetachedProcessLauncher {
	pub fn new(log_dir: impl Into<PathBuf>) -> Self {
		Self {
			log_dir: log_dir.into(),
		}
	}

	fn open_log(&self, log_name: &str) -> Result<(PathBuf, std::fs::File)> {
		let path = self.log_dir.join(format!("{log_name}.log"));
		let log_error = |source| ProcessError::LogFile {
			path: path.display().to_string(),
			source,
		};

		std::fs::create_dir_all(&self.log_dir).map_err(log_error)?;
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.map_err(log_error)?;
		Ok((path, file))
	}
}

#[async_trait]
impl WorkerLauncher for DetachedProcessLauncher {
	#[tracing::instrument(skip(self, invocation), fields(program = %invocation.program, log_name = %invocation.log_name))]
	async fn launch(&self, invocation: &WorkerInvocation) -> Result<LaunchedWorker> {
		let (log_path, stdout) = self.open_log(&invocation.log_name)?;
		let stderr = stdout.try_clone().map_err(|source| ProcessError::LogFile {
			path: log_path.display().to_string(),
			source,
		})?;

		let mut command = Command::new(&invocation.program);
		command
			.args(&invocation.args)
			.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
			.stdin(Stdio::null())
			.stdout(Stdio::from(stdout))
			.stderr(Stdio::from(stderr))
			.kill_on_drop(false);
		#[cfg(unix)]
		command.process_group(0);
		if let Some(dir) = &invocation.working_dir {
			command.current_dir(dir);
		}

		let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
			program: invocation.program.clone(),
			source,
		})?;
		let pid = child
			.id()
			.ok_or_else(|| ProcessError::Launcher("spawned worker has no pid".to_string()))?;

		// Reap the child when it exits so it does not linger as a zombie.
		tokio::spawn(async move {
			match child.wait().await {
				Ok(status) => tracing::debug!(pid, %status, "worker exited"),
				Err(e) => tracing::warn!(pid, error = %e, "failed to wait on worker"),
			}
		});

		tracing::info!(pid, log_path = %log_path.display(), "worker launched");
		Ok(LaunchedWorker {
			pid,
			log_path: Some(log_path.display().to_string()),
		})
	}
}

/// Starts workers inside a running container via `docker exec`.
///
/// The returned pid is the one the container's shell reports, so inspection
/// and signalling only line up when the supervisor shares the container's
/// pid namespace.
#[derive(Debug, Clone)]
pub struct ContainerExecLauncher {
	docker_bin: String,
	container: String,
	log_dir: PathBuf,
}

impl ContainerExecLauncher {
	pub fn new(
		docker_bin: impl Into<String>,
		container: impl Into<String>,
		log_dir: impl Into<PathBuf>,
	) -> Self {
		Self {
			docker_bin: docker_bin.into(),
			container: container.into(),
			log_dir: log_dir.into(),
		}
	}

	fn log_path(&self, log_name: &str) -> PathBuf {
		self.log_dir.join(format!("{log_name}.log"))
	}

	/// `sh -c` script that backgrounds the worker and prints its pid.
	pub(crate) fn exec_script(&self, invocation: &WorkerInvocation) -> String {
		let log_path = self.log_path(&invocation.log_name);
		let mut script = format!("mkdir -p {} && ", quote_path(&self.log_dir));
		if let Some(dir) = &invocation.working_dir {
			script.push_str(&format!("cd {} && ", quote_path(dir)));
		}
		script.push_str(&format!(
			"nohup {} >> {} 2>&1 < /dev/null & echo $!",
			invocation.command_line(),
			quote_path(&log_path)
		));
		script
	}

	pub(crate) fn exec_args(&self, invocation: &WorkerInvocation) -> Vec<String> {
		let mut args = vec!["exec".to_string()];
		for (key, value) in &invocation.env {
			args.push("-e".to_string());
			args.push(format!("{key}={value}"));
		}
		args.push(self.container.clone());
		args.push("sh".to_string());
		args.push("-c".to_string());
		args.push(self.exec_script(invocation));
		args
	}
}

fn quote_path(path: &Path) -> String {
	shell_quote(&path.display().to_string())
}

#[async_trait]
impl WorkerLauncher for ContainerExecLauncher {
	#[tracing::instrument(skip(self, invocation), fields(container = %self.container, program = %invocation.program))]
	async fn launch(&self, invocation: &WorkerInvocation) -> Result<LaunchedWorker> {
		let output = Command::new(&self.docker_bin)
			.args(self.exec_args(invocation))
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|source| ProcessError::Spawn {
				program: self.docker_bin.clone(),
				source,
			})?;

		if !output.status.success() {
			return Err(ProcessError::Launcher(format!(
				"{} exec exited with {}: {}",
				self.docker_bin,
				output.status,
				String::from_utf8_lossy(&output.stderr).trim()
			)));
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		let pid = stdout
			.lines()
			.rev()
			.map(str::trim)
			.find(|line| !line.is_empty())
			.and_then(|line| line.parse::<u32>().ok())
			.ok_or_else(|| {
				ProcessError::Launcher(format!("could not read worker pid from {:?}", stdout.trim()))
			})?;

		let log_path = self.log_path(&invocation.log_name).display().to_string();
		tracing::info!(pid, log_path = %log_path, "worker launched in container");
		Ok(LaunchedWorker {
			pid,
			log_path: Some(log_path),
		})
	}
}
