// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	CrawlerConfigLayer, DatabaseConfigLayer, HealthConfigLayer, LauncherKind, LogFormat,
	LoggingConfigLayer, MonitorConfigLayer, SchedulerConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/harvest/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: HARVEST_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from_env(&Env(|name: &str| std::env::var(name).ok()))
	}
}

/// Variable lookup, so the parsing can be tested without touching the process environment.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: FromStr>(&self, name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {kind} value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn list(&self, name: &str) -> Option<Vec<String>> {
		self.var(name).map(|s| {
			s.split(',')
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect()
		})
	}
}

fn load_from_env<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<ServerConfigLayer, ConfigError> {
	Ok(ServerConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env.var("HARVEST_SERVER_DATABASE_URL"),
		}),
		logging: Some(load_logging_from_env(env)?),
		health: Some(HealthConfigLayer {
			interval_secs: env.parse("HARVEST_SERVER_HEALTH_INTERVAL_SECS", "u64")?,
			stale_threshold_secs: env.parse("HARVEST_SERVER_HEALTH_STALE_THRESHOLD_SECS", "u64")?,
		}),
		monitor: Some(load_monitor_from_env(env)?),
		scheduler: Some(SchedulerConfigLayer {
			enabled: env.bool("HARVEST_SERVER_SCHEDULER_ENABLED"),
			interval_secs: env.parse("HARVEST_SERVER_SCHEDULER_INTERVAL_SECS", "u64")?,
			timezone: env.var("HARVEST_SERVER_SCHEDULER_TIMEZONE"),
		}),
		crawler: Some(load_crawler_from_env(env)?),
	})
}

fn load_logging_from_env<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env.var("HARVEST_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|message| ConfigError::InvalidValue {
			key: "HARVEST_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env.var("HARVEST_SERVER_LOG_LEVEL"),
		format,
	})
}

/// `HARVEST_SERVER_MONITOR_TIMEOUTS` is a list of `type=seconds` pairs.
fn parse_timeouts(raw: &[String]) -> Result<BTreeMap<String, u64>, ConfigError> {
	raw.iter()
		.map(|pair| -> Result<(String, u64), ConfigError> {
			let invalid = || ConfigError::InvalidValue {
				key: "HARVEST_SERVER_MONITOR_TIMEOUTS".to_string(),
				message: format!("expected type=seconds, got '{pair}'"),
			};
			let (job_type, secs) = pair.split_once('=').ok_or_else(invalid)?;
			let secs = secs.trim().parse::<u64>().map_err(|_| invalid())?;
			Ok((job_type.trim().to_string(), secs))
		})
		.collect()
}

fn load_monitor_from_env<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<MonitorConfigLayer, ConfigError> {
	let timeouts = match env.list("HARVEST_SERVER_MONITOR_TIMEOUTS") {
		Some(pairs) => Some(parse_timeouts(&pairs)?),
		None => None,
	};

	Ok(MonitorConfigLayer {
		timeouts,
		default_timeout_secs: env.parse("HARVEST_SERVER_MONITOR_DEFAULT_TIMEOUT_SECS", "u64")?,
		idle_threshold_secs: env.parse("HARVEST_SERVER_MONITOR_IDLE_THRESHOLD_SECS", "u64")?,
		idle_cpu_percent: env.parse("HARVEST_SERVER_MONITOR_IDLE_CPU_PERCENT", "f32")?,
		continuously_active: env.list("HARVEST_SERVER_MONITOR_CONTINUOUSLY_ACTIVE"),
		cancel_grace_secs: env.parse("HARVEST_SERVER_MONITOR_CANCEL_GRACE_SECS", "u64")?,
		cancel_poll_ms: env.parse("HARVEST_SERVER_MONITOR_CANCEL_POLL_MS", "u64")?,
	})
}

fn load_crawler_from_env<F: Fn(&str) -> Option<String>>(
	env: &Env<F>,
) -> Result<CrawlerConfigLayer, ConfigError> {
	let launcher = match env.var("HARVEST_SERVER_CRAWLER_LAUNCHER") {
		Some(v) => Some(v.parse::<LauncherKind>().map_err(|message| ConfigError::InvalidValue {
			key: "HARVEST_SERVER_CRAWLER_LAUNCHER".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(CrawlerConfigLayer {
		program: env.var("HARVEST_SERVER_CRAWLER_PROGRAM"),
		base_args: env
			.var("HARVEST_SERVER_CRAWLER_BASE_ARGS")
			.map(|s| s.split_whitespace().map(str::to_string).collect()),
		working_dir: env.var("HARVEST_SERVER_CRAWLER_WORKING_DIR").map(PathBuf::from),
		log_dir: env.var("HARVEST_SERVER_CRAWLER_LOG_DIR").map(PathBuf::from),
		default_max_depth: env.parse("HARVEST_SERVER_CRAWLER_DEFAULT_MAX_DEPTH", "u32")?,
		default_max_items: env.parse("HARVEST_SERVER_CRAWLER_DEFAULT_MAX_ITEMS", "u64")?,
		launcher,
		container: env.var("HARVEST_SERVER_CRAWLER_CONTAINER"),
		docker_bin: env.var("HARVEST_SERVER_CRAWLER_DOCKER_BIN"),
	})
}
