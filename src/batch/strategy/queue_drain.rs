//! Queue-drain shaper: items pass through one bounded queue and are drained in
//! chunks with a per-receive timeout.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub drained: usize,
    pub chunks: usize,
    /// Largest chunk taken off the queue in one pass.
    pub high_water: usize,
    /// The consumer gave up waiting for the next item.
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct QueueDrain {
    capacity: usize,
    recv_timeout: Duration,
}

impl QueueDrain {
    pub fn new(capacity: usize, recv_timeout: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            recv_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Feed `items` through the queue and hand each drained chunk to `on_chunk`
    /// together with the input position of its first item.
    ///
    /// A chunk is everything immediately available after one blocking receive,
    /// capped at the queue capacity. Input order is preserved. The next receive
    /// starts only once the handler's future has completed.
    pub async fn drain<T, F, Fut>(&self, items: Vec<T>, mut on_chunk: F) -> DrainReport
    where
        T: Send + 'static,
        F: FnMut(usize, Vec<T>) -> Fut,
        Fut: Future<Output = ()>,
    {
        // The queue never needs more slots than there are items.
        let bound = self
            .capacity
            .min(items.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let (tx, mut rx) = mpsc::channel::<T>(bound);
        let producer = tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let mut report = DrainReport::default();
        loop {
            let first = match tokio::time::timeout(self.recv_timeout, rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        drained = report.drained,
                        timeout_ms = self.recv_timeout.as_millis() as u64,
                        "queue drain timed out"
                    );
                    report.timed_out = true;
                    break;
                }
            };
            let mut chunk = Vec::with_capacity(bound);
            chunk.push(first);
            while chunk.len() < self.capacity {
                match rx.try_recv() {
                    Ok(item) => chunk.push(item),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            let offset = report.drained;
            report.drained += chunk.len();
            report.chunks += 1;
            report.high_water = report.high_water.max(chunk.len());
            on_chunk(offset, chunk).await;
        }

        rx.close();
        if let Err(e) = producer.await {
            warn!(error = %e, "queue producer failed");
        }
        debug!(
            drained = report.drained,
            chunks = report.chunks,
            "queue drained"
        );
        report
    }
}
