//! HashHunt CLI entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use hashhunt::config::cli::{Cli, ExecutionMode};
use hashhunt::config::{CoordinatorConfig, WorkerConfig};
use hashhunt::coordinator::{server, SearchCoordinator};

fn main() -> Result<()> {
    println!("HashHunt v{}", env!("CARGO_PKG_VERSION"));
    println!("Distributed hash preimage search");
    println!();

    let cli = Cli::parse_args();
    cli.validate()?;

    match cli.mode {
        ExecutionMode::Coordinator => run_coordinator(&cli),
        ExecutionMode::Worker => run_worker(&cli),
    }
}

/// Run in coordinator mode (owns the keyspace, serves workers)
fn run_coordinator(cli: &Cli) -> Result<()> {
    let config = CoordinatorConfig::from_cli(cli)?;

    println!(
        "Search space: [{}, {}], block size per unit: {}",
        config.space.lower_bound, config.space.upper_bound, config.space.block_size_per_unit
    );
    println!("Target hash: {}", config.target);
    println!();

    let coordinator = Arc::new(SearchCoordinator::new(config.space, config.target));

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(server::run(coordinator, config.listen_addr))
}

/// Run in worker mode (searches blocks assigned by a coordinator)
fn run_worker(cli: &Cli) -> Result<()> {
    let config = WorkerConfig::from_cli(cli)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(hashhunt::worker::run(config))
}
