// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	CrawlerConfigLayer, DatabaseConfigLayer, HealthConfigLayer, LoggingConfigLayer,
	MonitorConfigLayer, SchedulerConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub health: Option<HealthConfigLayer>,
	#[serde(default)]
	pub monitor: Option<MonitorConfigLayer>,
	#[serde(default)]
	pub scheduler: Option<SchedulerConfigLayer>,
	#[serde(default)]
	pub crawler: Option<CrawlerConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(&mut self.health, other.health, HealthConfigLayer::merge);
		merge_option(&mut self.monitor, other.monitor, MonitorConfigLayer::merge);
		merge_option(
			&mut self.scheduler,
			other.scheduler,
			SchedulerConfigLayer::merge,
		);
		merge_option(&mut self.crawler, other.crawler, CrawlerConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.health.is_none());
	}

	#[test]
	fn test_merge_other_overwrites() {
		let mut base = ServerConfigLayer {
			health: Some(HealthConfigLayer {
				interval_secs: Some(30),
				stale_threshold_secs: Some(600),
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			health: Some(HealthConfigLayer {
				interval_secs: Some(10),
				..Default::default()
			}),
			..Default::default()
		});
		let health = base.health.unwrap();
		assert_eq!(health.interval_secs, Some(10));
		assert_eq!(health.stale_threshold_secs, Some(600));
	}

	#[test]
	fn test_merge_adds_missing_sections() {
		let mut base = ServerConfigLayer {
			scheduler: Some(SchedulerConfigLayer {
				enabled: Some(false),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: Some("sqlite::memory:".to_string()),
			}),
			..Default::default()
		});
		assert_eq!(base.scheduler.unwrap().enabled, Some(false));
		assert_eq!(base.database.unwrap().url.as_deref(), Some("sqlite::memory:"));
	}
}
