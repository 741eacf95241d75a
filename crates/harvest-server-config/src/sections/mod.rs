// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for harvest-server.

pub mod crawler;
pub mod database;
pub mod health;
pub mod logging;
pub mod monitor;
pub mod scheduler;

pub use crawler::{CrawlerConfig, CrawlerConfigLayer, LauncherKind};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use health::{HealthConfig, HealthConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use monitor::{MonitorConfig, MonitorConfigLayer};
pub use scheduler::{SchedulerConfig, SchedulerConfigLayer};
