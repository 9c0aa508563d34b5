//! Correlation bridge between request handlers and the single worker loop.
//!
//! Architecture follows a reactor pattern:
//! - A dedicated reactor task owns the pending-request table
//! - Submissions flow through an unbounded mpsc channel, so `submit` never blocks
//! - The reactor forwards work to the worker in submission order
//! - Replies come back tagged with their request id and are routed to the
//!   caller's oneshot
//!
//! Usage:
//! ```ignore
//! let (bridge, port) = channel(BridgeOptions::default());  // Spawns reactor
//! let ticket = bridge.submit(item)?;
//! let reply = bridge.await_result(ticket).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::item::{ResultItem, WorkItem};

/// How often the reactor drops entries whose caller stopped waiting.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("no reply for request {request_id} after {waited:?}")]
    Timeout { request_id: Uuid, waited: Duration },

    #[error("worker is no longer running")]
    WorkerGone,

    #[error("bridge reactor has shut down")]
    Closed,
}

/// A message together with the bridge-assigned request id.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub request_id: Uuid,
    pub item: T,
}

/// Bridge tuning.
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Upper bound on how long `await_result` waits. `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

impl BridgeOptions {
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

type ReplySender = oneshot::Sender<Result<ResultItem, BridgeError>>;

/// Command sent to the reactor task
enum ReactorCommand {
    Submit {
        work: Tagged<WorkItem>,
        reply_tx: ReplySender,
    },
}

/// A submission waiting for its reply
struct PendingRequest {
    reply_tx: ReplySender,
    operation: String,
    submitted_at: Instant,
}

/// Claim check for one submitted work item.
///
/// Dropping a ticket abandons the request; its reply is discarded when it
/// arrives.
#[derive(Debug)]
pub struct Ticket {
    request_id: Uuid,
    reply_rx: oneshot::Receiver<Result<ResultItem, BridgeError>>,
}

impl Ticket {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

struct Shared {
    cmd_tx: mpsc::UnboundedSender<ReactorCommand>,
    pending: Arc<AtomicUsize>,
    worker_alive: Arc<AtomicBool>,
    options: BridgeOptions,
}

/// Handler-side end of the bridge. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

/// Worker-side end of the bridge. Exactly one exists per bridge.
pub struct WorkerPort {
    inbound_rx: mpsc::UnboundedReceiver<Tagged<WorkItem>>,
    outbound_tx: mpsc::UnboundedSender<Tagged<ResultItem>>,
}

/// Create a bridge and spawn its reactor task.
///
/// Must be called from within a Tokio runtime.
pub fn channel(options: BridgeOptions) -> (Bridge, WorkerPort) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let pending = Arc::new(AtomicUsize::new(0));
    let worker_alive = Arc::new(AtomicBool::new(true));

    let reactor = Reactor {
        cmd_rx,
        inbound_tx,
        outbound_rx,
        pending: HashMap::new(),
        pending_count: pending.clone(),
        worker_alive: worker_alive.clone(),
    };
    tokio::spawn(reactor.run());

    let bridge = Bridge {
        shared: Arc::new(Shared {
            cmd_tx,
            pending,
            worker_alive,
            options,
        }),
    };
    let port = WorkerPort {
        inbound_rx,
        outbound_tx,
    };

    (bridge, port)
}

impl Bridge {
    /// Enqueue a work item for the worker. Never blocks.
    pub fn submit(&self, item: WorkItem) -> Result<Ticket, BridgeError> {
        if !self.worker_alive() {
            return Err(BridgeError::WorkerGone);
        }

        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        trace!(
            request.id = %request_id,
            work.operation = %item.operation,
            work.correlation_id = %item.correlation_id,
            "Submitting work item"
        );

        self.shared
            .cmd_tx
            .send(ReactorCommand::Submit {
                work: Tagged { request_id, item },
                reply_tx,
            })
            .map_err(|_| BridgeError::Closed)?;

        Ok(Ticket {
            request_id,
            reply_rx,
        })
    }

    /// Wait for the reply to the ticket's work item, bounded by the
    /// configured reply timeout.
    pub async fn await_result(&self, ticket: Ticket) -> Result<ResultItem, BridgeError> {
        self.await_result_within(ticket, self.shared.options.reply_timeout)
            .await
    }

    /// Wait for the reply with an explicit bound. `None` waits forever.
    ///
    /// On timeout the ticket is dropped, so the late reply is discarded by
    /// the reactor instead of reaching some other caller.
    pub async fn await_result_within(
        &self,
        ticket: Ticket,
        limit: Option<Duration>,
    ) -> Result<ResultItem, BridgeError> {
        let request_id = ticket.request_id;
        let wait = async move {
            ticket
                .reply_rx
                .await
                .unwrap_or(Err(BridgeError::Closed))
        };

        match limit {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(request.id = %request_id, waited = ?limit, "Gave up waiting for worker reply");
                    Err(BridgeError::Timeout {
                        request_id,
                        waited: limit,
                    })
                }
            },
        }
    }

    /// Submit and wait as one unit.
    pub async fn request(&self, item: WorkItem) -> Result<ResultItem, BridgeError> {
        let ticket = self.submit(item)?;
        self.await_result(ticket).await
    }

    /// Requests submitted but not yet answered or abandoned.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    /// False once the worker side has gone away.
    pub fn worker_alive(&self) -> bool {
        self.shared.worker_alive.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.shared.options
    }
}

impl WorkerPort {
    /// Next work item in submission order. `None` once every [`Bridge`]
    /// handle is gone.
    pub async fn recv(&mut self) -> Option<Tagged<WorkItem>> {
        self.inbound_rx.recv().await
    }

    /// Publish the reply for `request_id`.
    pub fn reply(&self, request_id: Uuid, result: ResultItem) -> Result<(), BridgeError> {
        self.outbound_tx
            .send(Tagged {
                request_id,
                item: result,
            })
            .map_err(|_| BridgeError::Closed)
    }
}

/// The reactor task - owns the pending table and both worker queues.
struct Reactor {
    cmd_rx: mpsc::UnboundedReceiver<ReactorCommand>,
    inbound_tx: mpsc::UnboundedSender<Tagged<WorkItem>>,
    outbound_rx: mpsc::UnboundedReceiver<Tagged<ResultItem>>,
    pending: HashMap<Uuid, PendingRequest>,
    pending_count: Arc<AtomicUsize>,
    worker_alive: Arc<AtomicBool>,
}

impl Reactor {
    async fn run(mut self) {
        let mut cleanup_interval = tokio::time::interval(CLEANUP_INTERVAL);
        cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut outbound_open = true;

        debug!("Bridge reactor started");

        loop {
            tokio::select! {
                // Drain replies before accepting new work
                biased;

                reply = self.outbound_rx.recv(), if outbound_open => {
                    match reply {
                        Some(tagged) => self.route_reply(tagged),
                        None => {
                            outbound_open = false;
                            self.worker_gone();
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(ReactorCommand::Submit { work, reply_tx }) => {
                            self.forward(work, reply_tx);
                        }
                        None => {
                            info!("All bridge handles dropped, reactor exiting with {} pending", self.pending.len());
                            break;
                        }
                    }
                }

                _ = cleanup_interval.tick() => {
                    self.drop_abandoned();
                }
            }
        }

        debug!("Bridge reactor exiting");
    }

    fn forward(&mut self, work: Tagged<WorkItem>, reply_tx: ReplySender) {
        let request_id = work.request_id;
        let operation = work.item.operation.clone();

        if !self.worker_alive.load(Ordering::Relaxed) {
            let _ = reply_tx.send(Err(BridgeError::WorkerGone));
            return;
        }

        // Register first so a fast reply always finds its entry
        self.pending.insert(
            request_id,
            PendingRequest {
                reply_tx,
                operation,
                submitted_at: Instant::now(),
            },
        );

        if let Err(mpsc::error::SendError(work)) = self.inbound_tx.send(work) {
            warn!(request.id = %work.request_id, "Worker inbound queue closed");
            if let Some(req) = self.pending.remove(&work.request_id) {
                let _ = req.reply_tx.send(Err(BridgeError::WorkerGone));
            }
        } else {
            trace!(request.id = %request_id, "Forwarded to worker, {} pending", self.pending.len());
        }

        self.publish_count();
    }

    fn route_reply(&mut self, tagged: Tagged<ResultItem>) {
        match self.pending.remove(&tagged.request_id) {
            Some(req) => {
                trace!(
                    request.id = %tagged.request_id,
                    work.operation = %req.operation,
                    elapsed = ?req.submitted_at.elapsed(),
                    "Routing reply"
                );
                if req.reply_tx.send(Ok(tagged.item)).is_err() {
                    debug!(
                        request.id = %tagged.request_id,
                        work.operation = %req.operation,
                        "Discarding late reply, caller stopped waiting"
                    );
                }
            }
            None => {
                debug!(
                    request.id = %tagged.request_id,
                    "Discarding orphan reply (not in {} pending)",
                    self.pending.len()
                );
            }
        }
        self.publish_count();
    }

    fn worker_gone(&mut self) {
        self.worker_alive.store(false, Ordering::Relaxed);
        warn!("Worker side closed, failing {} pending requests", self.pending.len());
        for (id, req) in self.pending.drain() {
            let _ = req.reply_tx.send(Err(BridgeError::WorkerGone));
            trace!(request.id = %id, "Failed pending request, worker gone");
        }
        self.publish_count();
    }

    fn drop_abandoned(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, req| !req.reply_tx.is_closed());
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!("Dropped {} abandoned requests, {} remaining", dropped, self.pending.len());
            self.publish_count();
        }
    }

    fn publish_count(&self) {
        self.pending_count.store(self.pending.len(), Ordering::Relaxed);
    }
}
