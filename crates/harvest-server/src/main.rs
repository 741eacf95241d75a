// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Harvest job supervisor binary.

use clap::{Parser, Subcommand};
use harvest_jobs_core::{JobId, SourceId};
use harvest_server::{version, Harvest};
use harvest_server_config::{LogFormat, LoggingConfig, ServerConfig};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Harvest server - supervises crawl jobs and their worker processes.
#[derive(Parser, Debug)]
#[command(name = "harvest-server", about = "Crawl job supervisor", version)]
struct Args {
	/// TOML config file (default: /etc/harvest/server.toml)
	#[arg(long, global = true, env = "HARVEST_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the health checker and crawl scheduler until interrupted (default)
	Serve,
	/// Start a crawl for a source now
	Trigger { source_id: SourceId },
	/// Show a job, its worker process and the current diagnosis
	Status { job_id: JobId },
	/// Stop a job's worker and mark the job cancelled
	Cancel {
		job_id: JobId,
		/// SIGKILL immediately instead of SIGTERM with a grace period
		#[arg(long)]
		force: bool,
	},
	/// Create a pending retry of a failed or cancelled job
	Retry {
		job_id: JobId,
		/// Also start the worker for the new job
		#[arg(long)]
		launch: bool,
	},
	/// List pending, running and hanging jobs
	Active,
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let command = args.command.unwrap_or(Command::Serve);

	if let Command::Version = command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => harvest_server_config::load_config_with_file(path)?,
		None => harvest_server_config::load_config()?,
	};

	init_tracing(&config.logging);

	if let Command::Serve = command {
		return serve(&config).await;
	}

	let harvest = Harvest::connect(&config).await?;
	let service = &harvest.service;

	match command {
		Command::Trigger { source_id } => print_json(&service.trigger_crawl(source_id).await?),
		Command::Status { job_id } => print_json(&service.get_job_status(job_id).await?),
		Command::Cancel { job_id, force } => print_json(&service.cancel_job(job_id, force).await?),
		Command::Retry { job_id, launch } => {
			let retry = service.retry_job(job_id).await?;
			if launch {
				print_json(&service.relaunch_job(retry.id).await?)
			} else {
				print_json(&retry)
			}
		}
		Command::Active => print_json(&service.list_active_jobs().await?),
		Command::Serve | Command::Version => Ok(()),
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let json = logging.format == LogFormat::Json;

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| logging.level.clone().into()),
		)
		.with(json.then(|| {
			tracing_subscriber::fmt::layer()
				.json()
				.with_writer(std::io::stderr)
		}))
		.with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
		.init();
}

async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
	tracing::info!(
		database = %config.database.url,
		launcher = %config.crawler.launcher,
		scheduler_enabled = config.scheduler.enabled,
		"starting harvest-server"
	);

	let harvest = Harvest::connect(config).await?;
	let supervisor = harvest.supervisor();
	supervisor.start().await;

	tokio::signal::ctrl_c().await?;
	tracing::info!("Received shutdown signal");
	supervisor.shutdown().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
