// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hang detection and cancellation tunables.
//!
//! ```toml
//! [monitor]
//! default_timeout_secs = 1800
//! continuously_active = ["ingest", "evaluate"]
//!
//! [monitor.timeouts]
//! ingest = 7200
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_timeouts() -> BTreeMap<String, u64> {
	BTreeMap::from([
		("ingest".to_string(), 3600),
		("normalize".to_string(), 600),
		("evaluate".to_string(), 300),
		("export".to_string(), 1800),
	])
}

fn default_continuously_active() -> Vec<String> {
	vec![
		"ingest".to_string(),
		"normalize".to_string(),
		"evaluate".to_string(),
	]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfigLayer {
	/// Per job type; merged key by key over the defaults
	pub timeouts: Option<BTreeMap<String, u64>>,
	pub default_timeout_secs: Option<u64>,
	pub idle_threshold_secs: Option<u64>,
	pub idle_cpu_percent: Option<f32>,
	pub continuously_active: Option<Vec<String>>,
	pub cancel_grace_secs: Option<u64>,
	pub cancel_poll_ms: Option<u64>,
}

impl MonitorConfigLayer {
	pub fn merge(&mut self, other: Self) {
		match (self.timeouts.as_mut(), other.timeouts) {
			(Some(mine), Some(theirs)) => mine.extend(theirs),
			(None, Some(theirs)) => self.timeouts = Some(theirs),
			_ => {}
		}
		if other.default_timeout_secs.is_some() {
			self.default_timeout_secs = other.default_timeout_secs;
		}
		if other.idle_threshold_secs.is_some() {
			self.idle_threshold_secs = other.idle_threshold_secs;
		}
		if other.idle_cpu_percent.is_some() {
			self.idle_cpu_percent = other.idle_cpu_percent;
		}
		if other.continuously_active.is_some() {
			self.continuously_active = other.continuously_active;
		}
		if other.cancel_grace_secs.is_some() {
			self.cancel_grace_secs = other.cancel_grace_secs;
		}
		if other.cancel_poll_ms.is_some() {
			self.cancel_poll_ms = other.cancel_poll_ms;
		}
	}

	pub fn finalize(self) -> MonitorConfig {
		let defaults = MonitorConfig::default();
		let mut timeouts = defaults.timeouts;
		timeouts.extend(self.timeouts.unwrap_or_default());

		MonitorConfig {
			timeouts,
			default_timeout_secs: self
				.default_timeout_secs
				.unwrap_or(defaults.default_timeout_secs),
			idle_threshold_secs: self
				.idle_threshold_secs
				.unwrap_or(defaults.idle_threshold_secs),
			idle_cpu_percent: self.idle_cpu_percent.unwrap_or(defaults.idle_cpu_percent),
			continuously_active: self
				.continuously_active
				.unwrap_or(defaults.continuously_active),
			cancel_grace_secs: self.cancel_grace_secs.unwrap_or(defaults.cancel_grace_secs),
			cancel_poll_ms: self.cancel_poll_ms.unwrap_or(defaults.cancel_poll_ms),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
	pub timeouts: BTreeMap<String, u64>,
	pub default_timeout_secs: u64,
	pub idle_threshold_secs: u64,
	pub idle_cpu_percent: f32,
	pub continuously_active: Vec<String>,
	pub cancel_grace_secs: u64,
	pub cancel_poll_ms: u64,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			timeouts: default_timeouts(),
			default_timeout_secs: 1800,
			idle_threshold_secs: 300,
			idle_cpu_percent: 1.0,
			continuously_active: default_continuously_active(),
			cancel_grace_secs: 5,
			cancel_poll_ms: 200,
		}
	}
}
