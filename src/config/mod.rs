//! Configuration module
//!
//! Handles CLI argument parsing and the runtime configuration built from
//! it for each execution mode.

pub mod cli;

use anyhow::Context;

use crate::fingerprint::Fingerprint;
use crate::keyspace::SearchSpace;
use crate::Result;
use cli::Cli;

/// Coordinator runtime configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the listener binds to
    pub listen_addr: std::net::SocketAddr,
    /// The keyspace served to workers
    pub space: SearchSpace,
    /// Target digest, fixed for the lifetime of the process
    pub target: Fingerprint,
}

impl CoordinatorConfig {
    /// Build and validate the coordinator configuration from the CLI
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let space = SearchSpace {
            lower_bound: cli.start_number,
            upper_bound: cli.end_number,
            block_size_per_unit: cli.block_size_per_unit,
        };
        space.validate()?;

        let target = Fingerprint::parse(&cli.target_hash).context("Invalid --target-hash")?;

        let listen_addr = format!("{}:{}", cli.listen_host, cli.listen_port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    cli.listen_host, cli.listen_port
                )
            })?;

        Ok(Self {
            listen_addr,
            space,
            target,
        })
    }
}

/// Worker runtime configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator address (host:port)
    pub coordinator_addr: String,
    /// Local parallel execution units
    pub parallelism: usize,
}

impl WorkerConfig {
    /// Build the worker configuration from the CLI
    ///
    /// Parallelism defaults to the host's CPU count unless overridden.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let parallelism = cli.threads.unwrap_or_else(num_cpus::get).max(1);
        Ok(Self {
            coordinator_addr: cli.connect.clone(),
            parallelism,
        })
    }
}
