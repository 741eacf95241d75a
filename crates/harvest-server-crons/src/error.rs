// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for schedule evaluation.

use thiserror::Error;

/// Result type for schedule evaluation.
pub type Result<T> = std::result::Result<T, ScheduleError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
	#[error("invalid cron expression: {0}")]
	InvalidCronExpression(String),

	#[error("invalid timezone: {0}")]
	InvalidTimezone(String),

	#[error("no occurrence found for schedule {0}")]
	NoOccurrence(String),
}
