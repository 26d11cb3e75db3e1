//! Anchor persistence service
//!
//! [`AnchorService::spawn`] starts a task that owns a backend and the
//! [`PendingRequests`] tables; [`AnchorClient`] is the cheaply-cloneable
//! front-end. Arriving commands are registered in the pending tables first,
//! then executed against the backend in arrival order; each completion
//! resolves back through the request's oneshot as its table entry is removed.

use crate::anchor::guid::SerializableGuid;
use crate::anchor::pending::{PendingCounts, PendingRequests};
use crate::anchor::requests::{
    AnchorRecord, CompletionHandle, CompletionSource, EraseOutcome, EraseRequest,
    IncrementalResults, IncrementalSink, LoadOutcome, LoadRequest, SaveOutcome, SaveRequest,
};
use crate::anchor::vault::AnchorBackend;
use crate::config::ServiceConfig;
use crate::error::{GeopinError, Result};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Save {
        anchors: Vec<AnchorRecord>,
        completion: CompletionSource<SaveOutcome>,
    },
    Load {
        anchor_ids: Vec<SerializableGuid>,
        completion: CompletionSource<LoadOutcome>,
        incremental: Option<IncrementalSink>,
    },
    Erase {
        anchor_ids: Vec<SerializableGuid>,
        completion: CompletionSource<EraseOutcome>,
    },
    Counts {
        reply: oneshot::Sender<PendingCounts>,
    },
    Shutdown,
}

enum Ticket {
    Save(SerializableGuid),
    Load(SerializableGuid),
    Erase(SerializableGuid),
}

/// Handle to the running service task
#[derive(Debug)]
pub struct AnchorService {
    join: tokio::task::JoinHandle<()>,
}

impl AnchorService {
    /// Start the service loop on the current runtime
    ///
    /// Validates `config`, then returns the client and the service handle. The
    /// loop stops when every client is dropped or [`AnchorClient::shutdown`]
    /// is called; requests still pending at that point resolve with
    /// `ServiceStopped`.
    pub fn spawn<B>(backend: B, config: ServiceConfig) -> Result<(AnchorClient, AnchorService)>
    where
        B: AnchorBackend + Send + 'static,
    {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let pending = PendingRequests::with_config(config.map.clone());
        let join = tokio::spawn(run_loop(backend, pending, rx));
        Ok((AnchorClient { tx }, AnchorService { join }))
    }

    /// Wait for the service loop to finish
    pub async fn join(self) {
        // A panicked loop is a bug in the backend; surface it
        if let Err(e) = self.join.await {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
    }
}

async fn run_loop<B>(mut backend: B, mut pending: PendingRequests, mut rx: mpsc::Receiver<Command>)
where
    B: AnchorBackend + Send + 'static,
{
    log::debug!("anchor service loop started");
    let mut tickets: VecDeque<Ticket> = VecDeque::new();
    'outer: loop {
        let first = match rx.recv().await {
            Some(command) => command,
            None => break,
        };
        // Register the whole burst before touching the backend, so queued
        // requests are visible in the pending tables while earlier ones run.
        if enqueue(&mut pending, &mut tickets, first) {
            break 'outer;
        }
        loop {
            match rx.try_recv() {
                Ok(command) => {
                    if enqueue(&mut pending, &mut tickets, command) {
                        break 'outer;
                    }
                }
                Err(_) => break,
            }
        }
        while let Some(ticket) = tickets.pop_front() {
            execute(&mut backend, &mut pending, ticket).await;
        }
    }
    pending.abort_all("service stopped");
    log::debug!("anchor service loop stopped");
}

/// Register one command; returns true on shutdown
fn enqueue(pending: &mut PendingRequests, tickets: &mut VecDeque<Ticket>, command: Command) -> bool {
    match command {
        Command::Save {
            anchors,
            completion,
        } => match pending.register_save(SaveRequest { completion, anchors }) {
            Ok(id) => tickets.push_back(Ticket::Save(id)),
            Err(e) => log::debug!("failed to register save: {}", e),
        },
        Command::Load {
            anchor_ids,
            completion,
            incremental,
        } => match pending.register_load(LoadRequest {
            completion,
            anchor_ids,
            incremental,
        }) {
            Ok(id) => tickets.push_back(Ticket::Load(id)),
            Err(e) => log::debug!("failed to register load: {}", e),
        },
        Command::Erase {
            anchor_ids,
            completion,
        } => match pending.register_erase(EraseRequest {
            completion,
            anchor_ids,
        }) {
            Ok(id) => tickets.push_back(Ticket::Erase(id)),
            Err(e) => log::debug!("failed to register erase: {}", e),
        },
        Command::Counts { reply } => {
            let _ = reply.send(pending.counts());
        }
        Command::Shutdown => return true,
    }
    false
}

async fn execute<B>(backend: &mut B, pending: &mut PendingRequests, ticket: Ticket)
where
    B: AnchorBackend,
{
    match ticket {
        Ticket::Save(id) => {
            let request = match pending.take_save(id) {
                Ok(request) => request,
                Err(e) => {
                    log::debug!("save {} vanished: {}", id, e);
                    return;
                }
            };
            log::debug!("executing save {} ({} anchors)", id, request.anchors.len());
            let result = backend.save(request.anchors).await;
            request.completion.resolve(result);
        }
        Ticket::Load(id) => {
            let request = match pending.take_load(id) {
                Ok(request) => request,
                Err(e) => {
                    log::debug!("load {} vanished: {}", id, e);
                    return;
                }
            };
            log::debug!("executing load {} ({} ids)", id, request.anchor_ids.len());
            let result = backend
                .load(&request.anchor_ids, request.incremental.as_ref())
                .await;
            request.completion.resolve(result);
        }
        Ticket::Erase(id) => {
            let request = match pending.take_erase(id) {
                Ok(request) => request,
                Err(e) => {
                    log::debug!("erase {} vanished: {}", id, e);
                    return;
                }
            };
            log::debug!("executing erase {} ({} ids)", id, request.anchor_ids.len());
            let result = backend.erase(&request.anchor_ids).await;
            request.completion.resolve(result);
        }
    }
}

/// Cheaply-cloneable front-end to the anchor service
#[derive(Debug, Clone)]
pub struct AnchorClient {
    tx: mpsc::Sender<Command>,
}

impl AnchorClient {
    /// Persist a batch of anchors and await the outcome
    pub async fn save_anchors(&self, anchors: Vec<AnchorRecord>) -> Result<SaveOutcome> {
        let (completion, handle) = CompletionSource::channel();
        self.send(Command::Save {
            anchors,
            completion,
        })
        .await?;
        handle.await
    }

    /// Fetch anchors by id and await the batched outcome
    pub async fn load_anchors(&self, anchor_ids: Vec<SerializableGuid>) -> Result<LoadOutcome> {
        let (completion, handle) = CompletionSource::channel();
        self.send(Command::Load {
            anchor_ids,
            completion,
            incremental: None,
        })
        .await?;
        handle.await
    }

    /// Fetch anchors by id, streaming each record as the backend finds it
    ///
    /// Returns immediately with the stream and the handle for the batched
    /// outcome, so the caller can consume records while the load runs.
    pub async fn load_anchors_incremental(
        &self,
        anchor_ids: Vec<SerializableGuid>,
    ) -> Result<(IncrementalResults, CompletionHandle<LoadOutcome>)> {
        let (completion, handle) = CompletionSource::channel();
        let (sink, results) = IncrementalSink::channel();
        self.send(Command::Load {
            anchor_ids,
            completion,
            incremental: Some(sink),
        })
        .await?;
        Ok((results, handle))
    }

    /// Erase anchors by id and await the outcome
    pub async fn erase_anchors(&self, anchor_ids: Vec<SerializableGuid>) -> Result<EraseOutcome> {
        let (completion, handle) = CompletionSource::channel();
        self.send(Command::Erase {
            anchor_ids,
            completion,
        })
        .await?;
        handle.await
    }

    /// Snapshot of the in-flight request counts
    pub async fn pending_counts(&self) -> Result<PendingCounts> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Counts { reply }).await?;
        rx.await.map_err(|_| GeopinError::RequestDropped)
    }

    /// Ask the service loop to stop; pending requests resolve with
    /// `ServiceStopped`
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| GeopinError::service_stopped("command channel closed"))
    }
}
