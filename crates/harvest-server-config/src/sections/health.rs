// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health checker loop configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthConfigLayer {
	pub interval_secs: Option<u64>,
	pub stale_threshold_secs: Option<u64>,
}

impl HealthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.stale_threshold_secs.is_some() {
			self.stale_threshold_secs = other.stale_threshold_secs;
		}
	}

	pub fn finalize(self) -> HealthConfig {
		let defaults = HealthConfig::default();
		HealthConfig {
			interval_secs: self.interval_secs.unwrap_or(defaults.interval_secs),
			stale_threshold_secs: self
				.stale_threshold_secs
				.unwrap_or(defaults.stale_threshold_secs),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
	pub interval_secs: u64,
	/// Running jobs silent for longer than this are checked by the stale sweep
	pub stale_threshold_secs: u64,
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			interval_secs: 60,
			stale_threshold_secs: 7200, // 2 hours
		}
	}
}
