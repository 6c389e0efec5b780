// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use fleet_core::{
    runtime::DefaultRuntime, setup_logger, walk_directory, AgentFactory, FileConfigLoader,
    Supervisor,
};

/// Runs one telemetry agent per configuration file found in a directory.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Top-level configuration file, used for logging settings
    #[arg(long = "config", default_value = "telegraf.conf")]
    config: PathBuf,

    /// Directory scanned recursively for `*.conf` agent configurations
    #[arg(long = "config-directory", default_value = "conf.d")]
    config_directory: PathBuf,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();

    // the logger is not up yet, so this goes straight to stderr
    let (config, _guard) = match setup_logger(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("E! [agent] Starting err when read config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let files = match walk_directory(&args.config_directory) {
        Ok(files) => files,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "found {} config files in {}",
        files.len(),
        args.config_directory.display()
    );

    let factory = AgentFactory::new(FileConfigLoader, DefaultRuntime);
    let fleet = factory.build_fleet(files);

    let mut supervisor = Supervisor::new().with_shutdown_timeout(config.agent.shutdown_timeout);
    supervisor.launch(fleet);
    let report = supervisor.run_until_shutdown().await;

    info!(
        "exiting with {} agents completed and {} failed",
        report.completed(),
        report.failed()
    );
    ExitCode::SUCCESS
}
