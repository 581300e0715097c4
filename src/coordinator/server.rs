//! Coordinator network server
//!
//! Listens for worker connections and runs one session task per connection.
//! A session reads framed messages and drives the coordinator operations;
//! a paired writer task drains the session's outbound queue so coordinator
//! state changes never wait on a peer's socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::coordinator::{SearchCoordinator, WorkGrant, WorkerId};
use crate::fingerprint::Fingerprint;
use crate::protocol::{self, Message, ProtocolError, WorkMessage, PROTOCOL_VERSION};

/// How long a single outbound send may take before it is abandoned
///
/// Bounds the found broadcast: a dead or wedged peer costs at most this
/// long, and only on its own session's writer task.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for the stop broadcast to flush before the process exits
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Run the coordinator server until a match is found or the operator
/// interrupts it
pub async fn run(coordinator: Arc<SearchCoordinator>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind coordinator listener on {}", addr))?;
    println!("Coordinator listening on {}", addr);

    let mut next_worker_id: WorkerId = 0;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("Failed to accept connection")?;
                let worker_id = next_worker_id;
                next_worker_id += 1;

                println!("Client {} connected (worker {})", peer, worker_id);
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_session(coordinator, stream, worker_id, peer).await {
                        eprintln!("Error with client {}: {:#}", peer, e);
                    }
                });
            }
            candidate = coordinator.wait_found() => {
                // The stop fan-out is already queued on every session;
                // give the writers a moment to flush it.
                tokio::time::sleep(SHUTDOWN_GRACE).await;
                println!(
                    "Number {} found. Shutting down coordinator.",
                    Fingerprint::format_candidate(candidate)
                );
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Coordinator shutting down on interrupt.");
                return Ok(());
            }
        }
    }
}

/// Handle one worker connection for its whole lifetime
async fn handle_session(
    coordinator: Arc<SearchCoordinator>,
    stream: TcpStream,
    worker_id: WorkerId,
    peer: SocketAddr,
) -> Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Writer task: the only place this session touches the socket for
    // output. Bounded per-send time so a dead peer cannot wedge the
    // broadcast; failures are logged, not retried.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match timeout(SEND_TIMEOUT, protocol::write_message(&mut write_half, &msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("Warning: send to worker {} failed: {}", worker_id, e);
                    break;
                }
                Err(_) => {
                    eprintln!("Warning: send to worker {} timed out", worker_id);
                    break;
                }
            }
        }
    });

    let result = session_loop(&coordinator, &mut read_half, worker_id, peer, &tx).await;

    if let Some((range, held)) = coordinator.on_disconnect(worker_id) {
        println!(
            "Worker {} abandoned block [{}, {}] after {:.1}s; requeued",
            worker_id,
            range.start,
            range.end,
            held.as_secs_f64()
        );
    }
    println!("Client {} disconnected.", peer);

    // Closing our sender ends the writer once the queue drains.
    drop(tx);
    let _ = writer.await;

    result
}

/// Decode and dispatch inbound messages until the connection ends
async fn session_loop(
    coordinator: &SearchCoordinator,
    read_half: &mut OwnedReadHalf,
    worker_id: WorkerId,
    peer: SocketAddr,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<()> {
    loop {
        let msg = match protocol::read_message(read_half).await {
            Ok(msg) => msg,
            Err(e) if e.is_recoverable() => {
                // Malformed payload: the connection stays usable
                eprintln!("Warning: malformed message from {}: {}", peer, e);
                continue;
            }
            Err(ProtocolError::Transport(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                // Peer closed the connection
                return Ok(());
            }
            Err(e) => return Err(e).context("Connection lost"),
        };

        match msg {
            Message::Register(reg) => {
                if reg.protocol_version != PROTOCOL_VERSION {
                    anyhow::bail!(
                        "Protocol version mismatch: coordinator={}, worker={}",
                        PROTOCOL_VERSION,
                        reg.protocol_version
                    );
                }
                coordinator.register(worker_id, reg.parallelism, tx.clone());
                println!(
                    "Registered client {} with {} parallel units.",
                    peer, reg.parallelism
                );
            }
            Message::RequestWork(req) => {
                // A connection that never sent an explicit registration is
                // registered on first contact with its declared unit count.
                if !coordinator.is_registered(worker_id) {
                    coordinator.register(worker_id, req.parallelism, tx.clone());
                }

                let reply = match coordinator.request_block(worker_id) {
                    WorkGrant::Block(range) => Message::Work(WorkMessage {
                        start: range.start,
                        end: range.end,
                        target_hash: coordinator.target().to_string(),
                    }),
                    WorkGrant::NoWork => Message::NoWork,
                    WorkGrant::Stop => Message::Stop,
                };
                let _ = tx.send(reply);
            }
            Message::Found(found) => {
                if coordinator.report_found(worker_id, found.candidate) {
                    println!(
                        "Found number: {}",
                        Fingerprint::format_candidate(found.candidate)
                    );
                }
            }
            other => {
                eprintln!("Warning: unexpected message from {}: {:?}", peer, other);
            }
        }
    }
}
