//! The worker loop: one stateful worker, one item at a time.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::bridge::WorkerPort;
use crate::item::{ResultItem, WorkItem};

/// A stateful engine that answers work items.
///
/// Failures are expressed as replies; whatever `handle` returns is what the
/// HTTP caller receives.
#[async_trait]
pub trait Worker: Send + 'static {
    fn name(&self) -> &str;

    async fn handle(&mut self, item: &WorkItem) -> ResultItem;
}

/// Spawn the worker loop on the current runtime.
pub fn spawn_worker<W: Worker>(
    worker: W,
    port: WorkerPort,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_worker(worker, port, shutdown))
}

/// Drain the inbound queue strictly in order until shutdown or until every
/// bridge handle is dropped. The next item is not taken until the current
/// reply has been published.
pub async fn run_worker<W: Worker>(mut worker: W, mut port: WorkerPort, shutdown: CancellationToken) {
    info!(worker = worker.name(), "Worker loop started");
    let mut handled: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(worker = worker.name(), handled, "Worker loop cancelled");
                break;
            }
            next = port.recv() => next,
        };

        let Some(tagged) = next else {
            info!(worker = worker.name(), handled, "Bridge closed, worker loop exiting");
            break;
        };

        let span = tracing::info_span!(
            "worker.handle",
            request.id = %tagged.request_id,
            work.operation = %tagged.item.operation,
            work.correlation_id = %tagged.item.correlation_id,
        );
        let result = worker.handle(&tagged.item).instrument(span).await;
        handled += 1;

        debug!(request.id = %tagged.request_id, result.kind = %result.result_type, "Publishing reply");
        if port.reply(tagged.request_id, result).is_err() {
            warn!(worker = worker.name(), "Bridge reactor gone, dropping reply and stopping");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{channel, BridgeOptions};
    use crate::item::Payload;
    use serde_json::json;

    /// Counts calls; proves the worker keeps state between items.
    struct Counter {
        calls: u64,
    }

    #[async_trait]
    impl Worker for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn handle(&mut self, item: &WorkItem) -> ResultItem {
            self.calls += 1;
            ResultItem::json(
                item.operation.clone(),
                json!({"call": self.calls, "id": item.correlation_id}),
            )
        }
    }

    #[tokio::test]
    async fn sequential_requests_pair_in_order() {
        let (bridge, port) = channel(BridgeOptions::default());
        let shutdown = CancellationToken::new();
        let handle = spawn_worker(Counter { calls: 0 }, port, shutdown.clone());

        for n in 1..=20u64 {
            let id = format!("req-{}", n);
            let ticket = bridge
                .submit(WorkItem::new("count", id.clone(), Payload::new()).unwrap())
                .unwrap();
            let reply = bridge.await_result(ticket).await.unwrap();
            assert_eq!(reply.payload.as_json(), Some(&json!({"call": n, "id": id})));
        }

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_worker_fails_later_requests() {
        let (bridge, port) = channel(BridgeOptions::default());
        let shutdown = CancellationToken::new();
        let handle = spawn_worker(Counter { calls: 0 }, port, shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();

        let result = bridge
            .request(WorkItem::new("count", "late", Payload::new()).unwrap())
            .await;
        assert_eq!(result, Err(crate::BridgeError::WorkerGone));
    }
}
