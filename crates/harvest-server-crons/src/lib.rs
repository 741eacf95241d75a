// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron schedule evaluation for crawl sources.
//!
//! Pure functions over `(expression, timezone, instant)`; nothing here reads
//! the clock, so callers pass `now` explicitly.

mod error;
mod schedule;

pub use error::{Result, ScheduleError};
pub use schedule::{
	is_due, next_occurrence, prev_occurrence, validate_cron_expression, validate_timezone,
	CronSchedule,
};
