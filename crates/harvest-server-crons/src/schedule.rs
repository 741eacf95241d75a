// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schedule parsing, occurrence lookup and the due check.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

use crate::error::{Result, ScheduleError};

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
fn convert_to_cron_crate_format(expression: &str) -> String {
	let expression = expression.trim();
	match expression.split_whitespace().count() {
		5 => format!("0 {expression} *"),
		_ => expression.to_string(),
	}
}

fn parse_timezone(timezone: &str) -> Result<Tz> {
	timezone
		.parse()
		.map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))
}

/// A parsed cron expression bound to the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CronSchedule {
	expression: String,
	schedule: Schedule,
	tz: Tz,
}

impl CronSchedule {
	pub fn parse(expression: &str, timezone: &str) -> Result<Self> {
		let schedule = Schedule::from_str(&convert_to_cron_crate_format(expression))
			.map_err(|e| ScheduleError::InvalidCronExpression(format!("{expression}: {e}")))?;
		Ok(Self {
			expression: expression.trim().to_string(),
			schedule,
			tz: parse_timezone(timezone)?,
		})
	}

	pub fn expression(&self) -> &str {
		&self.expression
	}

	/// First occurrence strictly after `after`.
	pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
		let local = after.with_timezone(&self.tz);
		self
			.schedule
			.after(&local)
			.next()
			.map(|next| next.with_timezone(&Utc))
	}

	/// Latest occurrence strictly before `before`.
	pub fn prev_before(&self, before: DateTime<Utc>) -> Option<DateTime<Utc>> {
		let local = before.with_timezone(&self.tz);
		self
			.schedule
			.after(&local)
			.next_back()
			.map(|prev| prev.with_timezone(&Utc))
	}

	/// Whether a run is due in the window ending at `now + check_interval`.
	///
	/// Without a previous run the source is only due if `now` sits within two
	/// check intervals of the latest occurrence, so a newly scheduled source
	/// does not fire for an occurrence long past.
	pub fn is_due(
		&self,
		last_run: Option<DateTime<Utc>>,
		now: DateTime<Utc>,
		check_interval: Duration,
	) -> bool {
		match last_run {
			None => self
				.prev_before(now)
				.is_some_and(|prev| now - prev <= check_interval * 2),
			Some(last_run) => self
				.next_after(last_run)
				.is_some_and(|next| next <= now + check_interval),
		}
	}
}

/// Next occurrence of `expression` after `after`, evaluated in `timezone`.
///
/// # Errors
///
/// Returns an error if the expression or timezone is invalid, or if the
/// schedule has no further occurrence.
pub fn next_occurrence(
	expression: &str,
	timezone: &str,
	after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
	CronSchedule::parse(expression, timezone)?
		.next_after(after)
		.ok_or_else(|| ScheduleError::NoOccurrence(expression.to_string()))
}

/// Latest occurrence of `expression` before `before`, evaluated in `timezone`.
pub fn prev_occurrence(
	expression: &str,
	timezone: &str,
	before: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
	CronSchedule::parse(expression, timezone)?
		.prev_before(before)
		.ok_or_else(|| ScheduleError::NoOccurrence(expression.to_string()))
}

pub fn is_due(
	expression: &str,
	timezone: &str,
	last_run: Option<DateTime<Utc>>,
	now: DateTime<Utc>,
	check_interval: Duration,
) -> Result<bool> {
	Ok(CronSchedule::parse(expression, timezone)?.is_due(last_run, now, check_interval))
}

pub fn validate_cron_expression(expression: &str) -> Result<()> {
	Schedule::from_str(&convert_to_cron_crate_format(expression))
		.map_err(|e| ScheduleError::InvalidCronExpression(format!("{expression}: {e}")))?;
	Ok(())
}

pub fn validate_timezone(timezone: &str) -> Result<()> {
	parse_timezone(timezone).map(|_| ())
}
