// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job status and the allowed lifecycle edges.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	/// Created, worker not launched yet
	Pending,
	/// Worker launched and believed alive
	Running,
	/// Worker reported success
	Completed,
	/// Launch error, worker error, or process vanished
	Failed,
	/// Explicitly cancelled by a caller
	Cancelled,
	/// Running but diagnosed as stuck (timeout or idle)
	Hanging,
}

impl JobStatus {
	/// Statuses that still need supervision.
	pub const ACTIVE: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Running, JobStatus::Hanging];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
			Self::Hanging => "hanging",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}

	pub fn is_active(&self) -> bool {
		Self::ACTIVE.contains(self)
	}

	/// Whether `self -> next` is an edge of the lifecycle state machine.
	pub fn can_transition_to(&self, next: JobStatus) -> bool {
		use JobStatus::*;
		matches!(
			(self, next),
			(Pending, Running)
				| (Pending, Failed)
				| (Pending, Cancelled)
				| (Running, Completed)
				| (Running, Failed)
				| (Running, Hanging)
				| (Running, Cancelled)
				| (Hanging, Completed)
				| (Hanging, Failed)
				| (Hanging, Cancelled)
		)
	}

	pub fn can_cancel(&self) -> bool {
		self.can_transition_to(JobStatus::Cancelled)
	}

	/// Retry creates a sibling job; only finished-unsuccessfully jobs qualify.
	pub fn can_retry(&self) -> bool {
		matches!(self, Self::Failed | Self::Cancelled)
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"running" => Ok(Self::Running),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			"cancelled" => Ok(Self::Cancelled),
			"hanging" => Ok(Self::Hanging),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ALL: [JobStatus; 6] = [
		JobStatus::Pending,
		JobStatus::Running,
		JobStatus::Completed,
		JobStatus::Failed,
		JobStatus::Cancelled,
		JobStatus::Hanging,
	];

	#[test]
	fn terminal_states_have_no_outgoing_edges() {
		for from in ALL.iter().filter(|s| s.is_terminal()) {
			for to in ALL {
				assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
			}
		}
	}

	#[test]
	fn hanging_is_reachable_only_from_running() {
		for from in ALL {
			let allowed = from.can_transition_to(JobStatus::Hanging);
			assert_eq!(allowed, from == JobStatus::Running, "{from} -> hanging");
		}
	}

	#[test]
	fn pending_cannot_skip_to_completed() {
		assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
		assert!(!JobStatus::Pending.can_transition_to(JobStatus::Hanging));
	}

	#[test]
	fn hanging_does_not_go_back_to_running() {
		assert!(!JobStatus::Hanging.can_transition_to(JobStatus::Running));
		assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
	}

	#[test]
	fn cancel_and_retry_sets() {
		let cancellable: Vec<_> = ALL.into_iter().filter(|s| s.can_cancel()).collect();
		assert_eq!(
			cancellable,
			vec![JobStatus::Pending, JobStatus::Running, JobStatus::Hanging]
		);

		let retryable: Vec<_> = ALL.into_iter().filter(|s| s.can_retry()).collect();
		assert_eq!(retryable, vec![JobStatus::Failed, JobStatus::Cancelled]);
	}

	#[test]
	fn parses_every_display_form() {
		for status in ALL {
			assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
		}
		assert!("timeout".parse::<JobStatus>().is_err());
	}
}
