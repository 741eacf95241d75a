// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use harvest_jobs_core::TransitionError;
use harvest_server_db::DbError;
use harvest_server_process::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("Job not found: {0}")]
	NotFound(String),

	#[error("Source not found: {0}")]
	SourceNotFound(String),

	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error("Launch failed: {0}")]
	Launch(#[from] ProcessError),

	#[error(transparent)]
	IllegalTransition(#[from] TransitionError),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Repository error: {0}")]
	Repository(DbError),
}

impl JobError {
	/// Lost a race with another writer; the job has already moved on.
	pub fn is_superseded(&self) -> bool {
		matches!(self, Self::Conflict(_) | Self::IllegalTransition(_))
	}
}

impl From<DbError> for JobError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Transition(e) => Self::IllegalTransition(e),
			DbError::NotFound(what) => Self::NotFound(what),
			DbError::Conflict(what) => Self::Conflict(what),
			other => Self::Repository(other),
		}
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
