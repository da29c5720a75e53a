//! tundra2 CLI: run an incremental build from a frozen DAG.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use tundra2::cli::Cli;
use tundra2::driver::{Driver, DriverOptions};
use tundra2::signal::{SignalState, install_handler};
use tundra2::types::BuildResult;
use tundra2::utils::options_toml::load_options_toml;
use tundra2::utils::setup_logging;

fn main() -> ExitCode {
    let start_time = Instant::now();
    let cli = Cli::parse();

    if let Some(dir) = &cli.working_dir
        && let Err(err) = std::env::set_current_dir(dir)
    {
        eprintln!("cannot change to {}: {}", dir.display(), err);
        return ExitCode::from(1);
    }

    setup_logging(cli.verbose || cli.spammy_verbose, cli.spammy_verbose, cli.quiet);

    let options_file = load_options_toml(std::path::Path::new("."));
    let options = cli.to_driver_options(options_file.as_ref());
    let dump_stats = cli.debug;

    let result = match run(options, dump_stats) {
        Ok(result) => result,
        Err(err) => {
            error!("{:#}", err);
            BuildResult::SetupError
        }
    };

    debug!("total time: {:?}", start_time.elapsed());
    ExitCode::from(result.exit_code() as u8)
}

fn run(options: DriverOptions, dump_stats: bool) -> Result<BuildResult> {
    let signals = SignalState::new();
    install_handler(&signals).context("installing signal handler")?;

    let show_targets = options.show_targets;
    let dry_run = options.dry_run;
    let clean_only = options.clean;
    let rebuild = options.rebuild;

    let mut driver = Driver::new(options, signals);
    driver.init_data()?;

    if show_targets {
        driver.show_targets();
        return Ok(BuildResult::Ok);
    }

    driver.remove_stale_outputs();

    let node_count = driver.prepare_nodes()?;
    info!("{} nodes selected for this build", node_count);

    if clean_only && !rebuild {
        driver.clean_outputs();
        return Ok(BuildResult::Ok);
    }
    if rebuild {
        driver.clean_outputs();
    }

    if dry_run {
        driver.list_selected_nodes();
        return Ok(BuildResult::Ok);
    }

    let result = driver.build()?;

    // Persist even when interrupted or failed; nodes without a fresh
    // signature keep their previous records.
    driver.save_all()?;

    if dump_stats {
        driver.stats.dump();
    }

    Ok(result)
}
