//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Coordinator mode - owns the keyspace and hands out blocks
    Coordinator,
    /// Worker mode - connects to a coordinator and searches assigned blocks
    Worker,
}

/// HashHunt - distributed hash preimage search
#[derive(Parser, Debug)]
#[command(name = "hashhunt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: coordinator or worker
    #[arg(long, value_enum)]
    pub mode: ExecutionMode,

    // === Coordinator Options ===
    /// Host to listen on (coordinator mode)
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_host: String,

    /// Port to listen on (coordinator mode)
    #[arg(long, default_value = "5000")]
    pub listen_port: u16,

    /// First candidate of the search space (inclusive)
    #[arg(long, default_value = "0")]
    pub start_number: u64,

    /// Last candidate of the search space (inclusive)
    #[arg(long, default_value = "9999999999")]
    pub end_number: u64,

    /// Candidates per local execution unit in one assignment
    ///
    /// A worker declaring N units receives blocks of N times this size.
    #[arg(long, default_value = "200000")]
    pub block_size_per_unit: u64,

    /// Target digest to search for (32 hex characters, case-insensitive)
    #[arg(long, default_value = "EC9C0F7EDCC18A98B1F31853B1813301")]
    pub target_hash: String,

    // === Worker Options ===
    /// Coordinator address to connect to (worker mode)
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub connect: String,

    /// Number of local parallel execution units (default: CPU count)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate argument combinations before a mode starts
    pub fn validate(&self) -> crate::Result<()> {
        if self.threads == Some(0) {
            anyhow::bail!("--threads must be at least 1");
        }
        Ok(())
    }
}
