// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OS-facing half of the supervisor.
//!
//! - [`ProcessInspector`] answers "is this pid alive, and what is it doing"
//! - [`ProcessSignaller`] delivers SIGTERM/SIGKILL
//! - [`WorkerLauncher`] starts a detached worker and hands back its pid
//!
//! [`SystemProcesses`] implements the first two against the local process
//! table. The job layer only sees the traits, so tests swap in fakes.

mod error;
mod inspect;
mod launch;

pub use error::{ProcessError, Result};
pub use inspect::{ProcessInfo, ProcessInspector, ProcessSignaller, ProcessState, SystemProcesses};
pub use launch::{
	ContainerExecLauncher, DetachedProcessLauncher, LaunchedWorker, WorkerInvocation, WorkerLauncher,
};
