// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Build information for `harvest-server version`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the release pipeline; "unknown" for local builds.
pub const GIT_SHA: &str = match option_env!("HARVEST_GIT_SHA") {
	Some(sha) => sha,
	None => "unknown",
};

pub fn platform() -> String {
	format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Format version info for display.
pub fn format_version_info() -> String {
	format!(
		"harvest-server version: {VERSION}\n\
		 Git SHA:                {GIT_SHA}\n\
		 Platform:               {}",
		platform()
	)
}
