//! The Message Queue: FIFO buffering for operations received before the
//! runtime is `Ready`, drained in parallel batches once it becomes ready.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use crate::rpc::RpcRequest;

/// Fixed size of each parallel drain batch (`spec.md` §4.4).
pub const DRAIN_BATCH_SIZE: usize = 10;

/// A single pending operation, queued because the runtime was not yet
/// `Ready` when it arrived.
pub struct QueuedMessage {
    pub request: RpcRequest,
    pub arrived_at: Instant,
}

/// FIFO buffer of [`QueuedMessage`]s.
pub struct MessageQueue {
    inner: Mutex<VecDeque<QueuedMessage>>,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append `request` to the back of the queue, returning its 1-based
    /// position for the `messageQueued` acknowledgment.
    pub fn enqueue(&self, request: RpcRequest) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.push_back(QueuedMessage {
            request,
            arrived_at: Instant::now(),
        });
        inner.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every pending message in arrival order, grouped into batches
    /// of [`DRAIN_BATCH_SIZE`]. Batches are returned sequentially; the
    /// caller is responsible for running each batch's entries
    /// concurrently and the batches themselves one after another.
    pub fn drain_batches(&self) -> Vec<Vec<QueuedMessage>> {
        let mut inner = self.inner.lock().unwrap();
        let all: Vec<QueuedMessage> = inner.drain(..).collect();
        all.into_iter()
            .fold(Vec::new(), |mut batches: Vec<Vec<QueuedMessage>>, msg| {
                match batches.last_mut() {
                    Some(batch) if batch.len() < DRAIN_BATCH_SIZE => batch.push(msg),
                    _ => batches.push(vec![msg]),
                }
                batches
            })
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str) -> RpcRequest {
        RpcRequest::Exists {
            id: id.to_string(),
            path: "/x".to_string(),
        }
    }

    #[test]
    fn enqueue_reports_one_based_position() {
        let queue = MessageQueue::new();
        assert_eq!(queue.enqueue(req("a")), 1);
        assert_eq!(queue.enqueue(req("b")), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_batches_preserves_arrival_order_within_batch() {
        let queue = MessageQueue::new();
        for i in 0..25 {
            queue.enqueue(req(&i.to_string()));
        }
        let batches = queue.drain_batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 10);
        assert_eq!(batches[2].len(), 5);
        assert!(queue.is_empty());

        let RpcRequest::Exists { id, .. } = &batches[0][0].request else {
            panic!("wrong variant")
        };
        assert_eq!(id, "0");
    }

    #[test]
    fn drain_of_empty_queue_is_empty() {
        let queue = MessageQueue::new();
        assert!(queue.drain_batches().is_empty());
    }
}
