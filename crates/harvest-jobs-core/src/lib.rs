// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Harvest crawl supervisor.
//!
//! This crate holds the data model shared by every other Harvest crate:
//!
//! - [`Job`]: a supervised unit of work with an append-only timeline
//! - [`JobStatus`]: the lifecycle state machine
//! - [`JobPayload`]: caller-owned key/value data with reserved process keys
//! - [`Source`]: the externally owned crawl source used as scheduling input

pub mod error;
pub mod job;
pub mod source;
pub mod status;

pub use error::TransitionError;
pub use job::{Job, JobId, JobPayload, JobType, TimelineEntry};
pub use source::{Source, SourceConfig, SourceId};
pub use status::JobStatus;
