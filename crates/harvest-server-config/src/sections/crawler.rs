// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! How crawl workers are started.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where workers run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
	/// Detached child of this process
	#[default]
	Local,
	/// `docker exec` into a long-running crawler container
	Container,
}

impl FromStr for LauncherKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"local" => Ok(Self::Local),
			"container" | "docker" => Ok(Self::Container),
			other => Err(format!(
				"unknown launcher '{other}', expected local or container"
			)),
		}
	}
}

impl fmt::Display for LauncherKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Local => "local",
			Self::Container => "container",
		})
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrawlerConfigLayer {
	pub program: Option<String>,
	pub base_args: Option<Vec<String>>,
	pub working_dir: Option<PathBuf>,
	pub log_dir: Option<PathBuf>,
	pub default_max_depth: Option<u32>,
	pub default_max_items: Option<u64>,
	pub launcher: Option<LauncherKind>,
	pub container: Option<String>,
	pub docker_bin: Option<String>,
}

impl CrawlerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.program.is_some() {
			self.program = other.program;
		}
		if other.base_args.is_some() {
			self.base_args = other.base_args;
		}
		if other.working_dir.is_some() {
			self.working_dir = other.working_dir;
		}
		if other.log_dir.is_some() {
			self.log_dir = other.log_dir;
		}
		if other.default_max_depth.is_some() {
			self.default_max_depth = other.default_max_depth;
		}
		if other.default_max_items.is_some() {
			self.default_max_items = other.default_max_items;
		}
		if other.launcher.is_some() {
			self.launcher = other.launcher;
		}
		if other.container.is_some() {
			self.container = other.container;
		}
		if other.docker_bin.is_some() {
			self.docker_bin = other.docker_bin;
		}
	}

	pub fn finalize(self) -> CrawlerConfig {
		let defaults = CrawlerConfig::default();
		CrawlerConfig {
			program: self.program.unwrap_or(defaults.program),
			base_args: self.base_args.unwrap_or(defaults.base_args),
			working_dir: self.working_dir,
			log_dir: self.log_dir.unwrap_or(defaults.log_dir),
			default_max_depth: self.default_max_depth.unwrap_or(defaults.default_max_depth),
			default_max_items: self.default_max_items.unwrap_or(defaults.default_max_items),
			launcher: self.launcher.unwrap_or_default(),
			container: self.container.filter(|c| !c.trim().is_empty()),
			docker_bin: self.docker_bin.unwrap_or(defaults.docker_bin),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlerConfig {
	pub program: String,
	pub base_args: Vec<String>,
	pub working_dir: Option<PathBuf>,
	pub log_dir: PathBuf,
	pub default_max_depth: u32,
	pub default_max_items: u64,
	pub launcher: LauncherKind,
	pub container: Option<String>,
	pub docker_bin: String,
}

impl Default for CrawlerConfig {
	fn default() -> Self {
		Self {
			program: "scrapy".to_string(),
			base_args: vec!["crawl".to_string()],
			working_dir: None,
			log_dir: PathBuf::from("./logs/crawls"),
			default_max_depth: 3,
			default_max_items: 1000,
			launcher: LauncherKind::Local,
			container: None,
			docker_bin: "docker".to_string(),
		}
	}
}
