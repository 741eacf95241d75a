// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! # harvest-server-db
//!
//! SQLite persistence for supervised jobs and crawl sources.
//!
//! Each domain has a `*Store` trait (the seam the supervisor depends on) and
//! a `*Repository` struct holding a `SqlitePool` that implements it.
//!
//! | Variant | When |
//! |---------|------|
//! | `NotFound` | The caller named an id that should exist |
//! | `Conflict` | Lost a compare-and-swap, or a write would rebind a live process |
//! | `Transition` | The requested status edge is not in the lifecycle |
//! | `Internal` | Stored data could not be decoded |

mod error;
pub mod job;
pub mod pool;
pub mod source;
pub mod testing;

pub use error::{DbError, Result};
pub use job::{JobRepository, JobStore, PayloadUpdate};
pub use pool::{create_pool, run_migrations};
pub use source::{SourceRepository, SourceStore};
