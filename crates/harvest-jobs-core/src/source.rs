// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crawl sources as seen by the supervisor.
//!
//! Sources are owned by the CRUD layer. The supervisor only reads the
//! schedule, `last_run` and crawl configuration, and writes `last_run`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SourceId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for SourceId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
	pub id: SourceId,
	pub name: String,
	/// "website", "sitemap", "rss", ...; selects the worker
	pub source_type: String,
	/// Cron expression; `None` or blank disables scheduling
	pub schedule: Option<String>,
	pub is_active: bool,
	/// Raw crawl configuration, see [`SourceConfig`]
	pub config: Value,
	pub last_run: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Source {
	pub fn new(name: impl Into<String>, source_type: impl Into<String>, config: Value) -> Self {
		let now = Utc::now();
		Self {
			id: SourceId::new(),
			name: name.into(),
			source_type: source_type.into(),
			schedule: None,
			is_active: true,
			config,
			last_run: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
		self.schedule = Some(schedule.into());
		self
	}

	/// The schedule expression, if one is configured.
	pub fn schedule_expression(&self) -> Option<&str> {
		self
			.schedule
			.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
	}

	pub fn parsed_config(&self) -> Result<SourceConfig, serde_json::Error> {
		serde_json::from_value(self.config.clone())
	}
}

/// Typed view over a source's crawl configuration.
///
/// Unknown keys are kept in `extra` and forwarded to the worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
	#[serde(default)]
	pub start_urls: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_depth: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_items: Option<u64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub allowed_domains: Vec<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
