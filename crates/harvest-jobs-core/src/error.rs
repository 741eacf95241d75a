// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for job lifecycle operations.

use thiserror::Error;

use crate::JobStatus;

/// A requested status change that the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
	#[error("cannot move job from {from} to {to}")]
	InvalidEdge { from: JobStatus, to: JobStatus },

	#[error("cannot cancel job in status {0}")]
	NotCancellable(JobStatus),

	#[error("cannot retry job in status {0}")]
	NotRetryable(JobStatus),

	#[error("cannot launch job in status {0}")]
	NotLaunchable(JobStatus),
}
