// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the Harvest job supervisor.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`HARVEST_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use harvest_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("health check every {}s", config.health.interval_secs);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub health: HealthConfig,
	pub monitor: MonitorConfig,
	pub scheduler: SchedulerConfig,
	pub crawler: CrawlerConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`HARVEST_SERVER_*`)
/// 2. Config file (`/etc/harvest/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		health: layer.health.unwrap_or_default().finalize(),
		monitor: layer.monitor.unwrap_or_default().finalize(),
		scheduler: layer.scheduler.unwrap_or_default().finalize(),
		crawler: layer.crawler.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		health_interval_secs = config.health.interval_secs,
		scheduler_enabled = config.scheduler.enabled,
		timezone = %config.scheduler.timezone,
		launcher = %config.crawler.launcher,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	let non_zero = [
		("health.interval_secs", config.health.interval_secs),
		(
			"health.stale_threshold_secs",
			config.health.stale_threshold_secs,
		),
		("scheduler.interval_secs", config.scheduler.interval_secs),
		(
			"monitor.default_timeout_secs",
			config.monitor.default_timeout_secs,
		),
		("monitor.cancel_poll_ms", config.monitor.cancel_poll_ms),
	];
	if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
		return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
	}

	if let Some((job_type, _)) = config.monitor.timeouts.iter().find(|(_, secs)| **secs == 0) {
		return Err(ConfigError::Validation(format!(
			"monitor.timeouts.{job_type} must be greater than zero"
		)));
	}

	if !config.monitor.idle_cpu_percent.is_finite() || config.monitor.idle_cpu_percent < 0.0 {
		return Err(ConfigError::Validation(
			"monitor.idle_cpu_percent must be a non-negative number".to_string(),
		));
	}

	if config.crawler.launcher == LauncherKind::Container && config.crawler.container.is_none() {
		return Err(ConfigError::Validation(
			"crawler.launcher = \"container\" requires crawler.container \
			 (HARVEST_SERVER_CRAWLER_CONTAINER) to name the crawler container"
				.to_string(),
		));
	}

	harvest_server_crons::validate_timezone(&config.scheduler.timezone)
		.map_err(|e| ConfigError::Validation(format!("scheduler.timezone: {e}")))?;

	Ok(())
}
