//! Rendezvous channel between the launcher and the child test runtime.
//!
//! Each [`crate::runner::ProcessRunner`] owns a [`Registry`] mapping a unique
//! key to one request/response exchange, and serves it over a loopback TCP
//! listener. The child receives the port and key as its last two arguments,
//! then speaks newline-delimited JSON [`Frame`]s:
//!
//! 1. `fetch` with its key, answered by `request` (or `error`);
//! 2. `respond` with its key and an [`ExecutionOutcome`], answered by `ack`.
//!
//! The child must wait for the `ack` before exiting, so the outcome is in the
//! registry by the time the launcher sees the process terminate.

pub mod client;

use crate::payload::{ExecutionPayload, ExecutionRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the child deposits once it is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { payload: ExecutionPayload },
    Failure { message: String },
}

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Fetch { key: String },
    Request { request: ExecutionRequest },
    Respond { key: String, outcome: ExecutionOutcome },
    Ack,
    Error { message: String },
}

#[derive(Debug)]
struct Exchange {
    request: ExecutionRequest,
    outcome: Option<ExecutionOutcome>,
}

/// Pending exchanges, keyed by rendezvous key.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<Mutex<HashMap<String, Exchange>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request under a fresh key. The entry lives exactly as long
    /// as the returned guard.
    pub fn register(&self, request: ExecutionRequest) -> Registration {
        let key = uuid::Uuid::new_v4().to_string();
        self.lock().insert(
            key.clone(),
            Exchange {
                request,
                outcome: None,
            },
        );
        tracing::debug!("Registered rendezvous key {}", key);
        Registration {
            key,
            registry: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn request(&self, key: &str) -> Option<ExecutionRequest> {
        self.lock().get(key).map(|exchange| exchange.request.clone())
    }

    fn deposit(&self, key: &str, outcome: ExecutionOutcome) -> bool {
        match self.lock().get_mut(key) {
            Some(exchange) => {
                exchange.outcome = Some(outcome);
                true
            }
            None => false,
        }
    }

    fn take_outcome(&self, key: &str) -> Option<ExecutionOutcome> {
        self.lock()
            .get_mut(key)
            .and_then(|exchange| exchange.outcome.take())
    }

    fn unregister(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Exchange>> {
        // The map holds plain data, so a poisoned lock is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer one frame from a child.
    fn handle(&self, frame: Frame) -> Frame {
        match frame {
            Frame::Fetch { key } => match self.request(&key) {
                Some(request) => Frame::Request { request },
                None => Frame::Error {
                    message: format!("unknown rendezvous key {}", key),
                },
            },
            Frame::Respond { key, outcome } => {
                if self.deposit(&key, outcome) {
                    Frame::Ack
                } else {
                    Frame::Error {
                        message: format!("unknown rendezvous key {}", key),
                    }
                }
            }
            other => Frame::Error {
                message: format!("unexpected frame from child: {:?}", other),
            },
        }
    }
}

/// Scoped registry entry; dropping it unregisters the key.
#[derive(Debug)]
pub struct Registration {
    key: String,
    registry: Registry,
}

impl Registration {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Take the outcome the child deposited, if any.
    pub fn take_outcome(&self) -> Option<ExecutionOutcome> {
        self.registry.take_outcome(&self.key)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.key);
        tracing::debug!("Unregistered rendezvous key {}", self.key);
    }
}

/// Loopback listener serving a registry. Stops accepting when dropped.
pub struct RendezvousServer {
    port: u16,
    accept_task: JoinHandle<()>,
}

impl RendezvousServer {
    pub async fn bind(registry: Registry) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        tracing::debug!("Rendezvous listening on 127.0.0.1:{}", port);

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, registry).await {
                                tracing::warn!("Rendezvous connection from {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Rendezvous accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self { port, accept_task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for RendezvousServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(stream: TcpStream, registry: Registry) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Frame>(&line) {
            Ok(frame) => registry.handle(frame),
            Err(e) => Frame::Error {
                message: format!("malformed frame: {}", e),
            },
        };
        write_frame(&mut writer, &reply).await?;
    }

    Ok(())
}

pub(crate) async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
