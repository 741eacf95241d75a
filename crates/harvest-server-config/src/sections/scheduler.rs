// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crawl scheduler loop configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfigLayer {
	pub enabled: Option<bool>,
	pub interval_secs: Option<u64>,
	pub timezone: Option<String>,
}

impl SchedulerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.timezone.is_some() {
			self.timezone = other.timezone;
		}
	}

	pub fn finalize(self) -> SchedulerConfig {
		let defaults = SchedulerConfig::default();
		SchedulerConfig {
			enabled: self.enabled.unwrap_or(defaults.enabled),
			interval_secs: self.interval_secs.unwrap_or(defaults.interval_secs),
			timezone: self.timezone.unwrap_or(defaults.timezone),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
	pub enabled: bool,
	pub interval_secs: u64,
	/// IANA name schedules are evaluated in
	pub timezone: String,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			interval_secs: 60,
			timezone: "UTC".to_string(),
		}
	}
}
