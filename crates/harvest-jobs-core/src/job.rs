// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job types: identity, category, timeline and payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{JobStatus, TransitionError};

/// Reserved payload key holding the worker's process id.
pub const PROCESS_ID_KEY: &str = "process_id";
/// Reserved payload key holding the worker's log file.
pub const LOG_PATH_KEY: &str = "log_path";

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Job category. Selects the timeout policy and the idle heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
	Ingest,
	Normalize,
	Evaluate,
	Export,
	Other(String),
}

impl JobType {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Ingest => "ingest",
			Self::Normalize => "normalize",
			Self::Evaluate => "evaluate",
			Self::Export => "export",
			Self::Other(name) => name,
		}
	}
}

impl fmt::Display for JobType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobType {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"ingest" => Self::Ingest,
			"normalize" => Self::Normalize,
			"evaluate" => Self::Evaluate,
			"export" => Self::Export,
			other => Self::Other(other.to_string()),
		})
	}
}

impl From<String> for JobType {
	fn from(value: String) -> Self {
		match value.parse() {
			Ok(job_type) => job_type,
			Err(never) => match never {},
		}
	}
}

impl From<&str> for JobType {
	fn from(value: &str) -> Self {
		Self::from(value.to_string())
	}
}

impl From<JobType> for String {
	fn from(value: JobType) -> Self {
		value.as_str().to_string()
	}
}

/// One entry of a job's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
	pub timestamp: DateTime<Utc>,
	pub status: JobStatus,
	pub message: String,
}

/// Caller-owned job data.
///
/// `process_id` and `log_path` are the only keys the supervisor reads or
/// writes; everything else round-trips untouched through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub process_id: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub log_path: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl JobPayload {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.insert(key, value);
		self
	}

	/// Insert a value, routing reserved keys to their typed fields.
	pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
		let value = value.into();
		match key {
			PROCESS_ID_KEY => {
				self.process_id = value.as_u64().and_then(|pid| u32::try_from(pid).ok());
			}
			LOG_PATH_KEY => {
				self.log_path = value.as_str().map(str::to_string);
			}
			_ => {
				self.extra.insert(key.to_string(), value);
			}
		}
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.extra.get(key)
	}

	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.extra.get(key).and_then(Value::as_str)
	}

	/// Copy of the caller-owned keys, without the process bindings.
	pub fn without_process(&self) -> Self {
		Self {
			process_id: None,
			log_path: None,
			extra: self.extra.clone(),
		}
	}
}

/// A supervised unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: JobId,
	#[serde(rename = "type")]
	pub job_type: JobType,
	pub status: JobStatus,
	pub timeline: Vec<TimelineEntry>,
	pub retries: u32,
	pub error: Option<String>,
	pub payload: JobPayload,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Job {
	/// A new `pending` job whose timeline starts with `message`.
	pub fn new(job_type: JobType, payload: JobPayload, message: impl Into<String>) -> Self {
		Self::new_at(job_type, payload, message, Utc::now())
	}

	pub fn new_at(
		job_type: JobType,
		payload: JobPayload,
		message: impl Into<String>,
		at: DateTime<Utc>,
	) -> Self {
		Self {
			id: JobId::new(),
			job_type,
			status: JobStatus::Pending,
			timeline: vec![TimelineEntry {
				timestamp: at,
				status: JobStatus::Pending,
				message: message.into(),
			}],
			retries: 0,
			error: None,
			payload,
			created_at: at,
			updated_at: at,
		}
	}

	/// Build the sibling job produced by retrying `self`.
	///
	/// The original is left untouched; the new job starts `pending` with
	/// `retries + 1` and the caller-owned payload keys.
	pub fn retry_of(&self, at: DateTime<Utc>) -> Result<Job, TransitionError> {
		if !self.status.can_retry() {
			return Err(TransitionError::NotRetryable(self.status));
		}

		let retries = self.retries + 1;
		let mut job = Job::new_at(
			self.job_type.clone(),
			self.payload.without_process(),
			format!("Retry #{retries} of job {}", self.id),
			at,
		);
		job.retries = retries;
		Ok(job)
	}

	/// Move to `to`, appending exactly one timeline entry.
	///
	/// On error nothing is modified.
	pub fn apply_transition(
		&mut self,
		to: JobStatus,
		message: impl Into<String>,
		error: Option<String>,
		at: DateTime<Utc>,
	) -> Result<(), TransitionError> {
		if !self.status.can_transition_to(to) {
			return Err(match to {
				JobStatus::Cancelled => TransitionError::NotCancellable(self.status),
				_ => TransitionError::InvalidEdge {
					from: self.status,
					to,
				},
			});
		}

		self.timeline.push(TimelineEntry {
			timestamp: at,
			status: to,
			message: message.into(),
		});
		self.status = to;
		if error.is_some() {
			self.error = error;
		}
		self.updated_at = at;
		Ok(())
	}

	/// Timestamp of the most recent timeline entry.
	pub fn last_update(&self) -> DateTime<Utc> {
		self
			.timeline
			.last()
			.map(|entry| entry.timestamp)
			.unwrap_or(self.updated_at)
	}

	pub fn process_id(&self) -> Option<u32> {
		self.payload.process_id
	}

	/// `status` agrees with the final timeline entry.
	pub fn is_consistent(&self) -> bool {
		self.timeline.last().map(|entry| entry.status) == Some(self.status)
	}
}
