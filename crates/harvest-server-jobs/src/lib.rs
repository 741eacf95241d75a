// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job supervision for Harvest.
//!
//! The [`JobMonitor`] diagnoses, cancels and retries jobs; the
//! [`CrawlOrchestrator`] turns sources into running crawl workers. Two
//! periodic tasks, the [`HealthChecker`] and the [`CrawlScheduler`], are run
//! by the [`JobSupervisor`] until shutdown. [`CrawlService`] is the surface
//! callers use.

pub mod checker;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod policy;
pub mod scheduler;
pub mod service;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use checker::{HealthChecker, HealthTickReport};
pub use error::{JobError, Result};
pub use monitor::{Diagnosis, HangReason, JobMonitor, JobStatusReport};
pub use orchestrator::{validate_source_config, worker_for_source_type, CrawlOrchestrator};
pub use policy::{CrawlerSettings, MonitorPolicy};
pub use scheduler::{CrawlScheduler, SchedulerTickReport};
pub use service::CrawlService;
pub use supervisor::{JobSupervisor, PeriodicTask};
