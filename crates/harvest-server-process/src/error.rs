// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessError>;

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("failed to spawn {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to open log file {path}: {source}")]
	LogFile {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to signal process {pid}: {message}")]
	Signal { pid: u32, message: String },

	#[error("launcher error: {0}")]
	Launcher(String),
}
