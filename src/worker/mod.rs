//! Worker node
//!
//! A worker connects to the coordinator, declares its local parallelism,
//! and runs the request/search/report cycle until it reports a match or
//! the coordinator tells it there is nothing left to do. Each received
//! block is fanned out across the local search pool.

pub mod pool;

use anyhow::Context;
use tokio::net::TcpStream;

use crate::config::WorkerConfig;
use crate::fingerprint::Fingerprint;
use crate::keyspace::BlockRange;
use crate::protocol::{
    self, FoundMessage, Message, RegisterMessage, RequestWorkMessage, PROTOCOL_VERSION,
};
use crate::Result;
use pool::SearchPool;

/// Run the worker until the coordinator stops it or the keyspace runs dry
pub async fn run(config: WorkerConfig) -> Result<()> {
    let node_id = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    println!(
        "Worker node {} with {} parallel units",
        node_id, config.parallelism
    );

    let mut stream = TcpStream::connect(&config.coordinator_addr)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to coordinator at {}",
                config.coordinator_addr
            )
        })?;
    println!("Connected to coordinator at {}", config.coordinator_addr);

    protocol::write_message(
        &mut stream,
        &Message::Register(RegisterMessage {
            protocol_version: PROTOCOL_VERSION,
            parallelism: config.parallelism as u32,
        }),
    )
    .await
    .context("Failed to register with coordinator")?;

    let pool = SearchPool::new(config.parallelism);

    loop {
        protocol::write_message(
            &mut stream,
            &Message::RequestWork(RequestWorkMessage {
                parallelism: config.parallelism as u32,
            }),
        )
        .await
        .context("Failed to request work")?;

        // Read until an actionable reply arrives; anything the coordinator
        // should never send is logged and skipped.
        let reply = loop {
            match next_message(&mut stream).await? {
                msg @ (Message::Work(_) | Message::Stop | Message::NoWork) => break msg,
                other => {
                    eprintln!("Warning: unexpected message from coordinator: {:?}", other)
                }
            }
        };

        match reply {
            Message::Work(work) => {
                println!("Received work: {} - {}", work.start, work.end);
                let target = Fingerprint::parse(&work.target_hash)
                    .context("Coordinator sent an invalid target hash")?;
                let block = BlockRange::new(work.start, work.end);

                // The search is pure CPU; run it off the reactor so the
                // runtime stays responsive.
                let result = tokio::task::spawn_blocking(move || pool.search(block, &target))
                    .await
                    .context("Search task failed")??;

                if let Some(candidate) = result {
                    protocol::write_message(&mut stream, &Message::Found(FoundMessage { candidate }))
                        .await
                        .context("Failed to report found candidate")?;
                    println!(
                        "Found the number: {}",
                        Fingerprint::format_candidate(candidate)
                    );
                    return Ok(());
                }
            }
            Message::Stop => {
                println!("Received stop signal from coordinator.");
                return Ok(());
            }
            Message::NoWork => {
                println!("No more work available. Exiting.");
                return Ok(());
            }
            _ => unreachable!("filtered above"),
        }
    }
}

/// Read the next well-formed message, discarding malformed payloads
///
/// A transport failure aborts the current search pass: there is no way to
/// report results on a broken stream, so the worker terminates.
async fn next_message(stream: &mut TcpStream) -> Result<Message> {
    loop {
        match protocol::read_message(stream).await {
            Ok(msg) => return Ok(msg),
            Err(e) if e.is_recoverable() => {
                eprintln!("Warning: malformed message from coordinator: {}", e);
            }
            Err(e) => return Err(e).context("Connection to coordinator lost"),
        }
    }
}
