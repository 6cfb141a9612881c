//! Request queue
//!
//! Decouples HTTP ingestion from asynchronous delivery. Handlers push
//! control requests onto a FIFO queue; a pool of workers pulls them off
//! and executes them. Shutdown is cooperative: once `shutdown` is called
//! no new requests are accepted, workers drain what is already queued and
//! then stop.

use chrono::{DateTime, Utc};
use courier_core::domain::ControlRequest;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A control request with its queueing metadata
#[derive(Debug)]
pub struct QueuedRequest {
    /// Correlation id used in logs
    pub id: Uuid,
    pub queued_at: DateTime<Utc>,
    pub request: ControlRequest,
}

impl QueuedRequest {
    pub fn new(request: ControlRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            queued_at: Utc::now(),
            request,
        }
    }
}

/// FIFO queue feeding the dispatcher worker pool
pub struct RequestQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedRequest>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedRequest>>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Enqueue a request for execution, returning its correlation id.
    /// Fails once shutdown has begun.
    pub fn queue(&self, request: ControlRequest) -> Option<Uuid> {
        let entry = QueuedRequest::new(request);
        let id = entry.id;
        let sender = self.sender.lock().expect("queue lock poisoned");
        match sender.as_ref() {
            Some(tx) if tx.send(entry).is_ok() => Some(id),
            _ => None,
        }
    }

    /// The next request to execute. Returns None only when shutdown has
    /// begun and the queue is fully drained.
    pub async fn next(&self) -> Option<QueuedRequest> {
        self.receiver.lock().await.recv().await
    }

    /// Begin cooperative shutdown: stop accepting requests and let the
    /// workers drain the remainder.
    pub fn shutdown(&self) {
        self.sender.lock().expect("queue lock poisoned").take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::domain::{CallerIdentity, ControlIntent, KvList};

    fn write_request(service: &str) -> ControlRequest {
        ControlRequest::new(
            CallerIdentity::default(),
            None,
            ControlIntent::WriteService {
                service: service.to_string(),
                values: KvList::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = RequestQueue::new();
        queue.queue(write_request("a")).unwrap();
        queue.queue(write_request("b")).unwrap();
        queue.queue(write_request("c")).unwrap();

        for expected in ["a", "b", "c"] {
            let entry = queue.next().await.unwrap();
            match entry.request.intent {
                ControlIntent::WriteService { ref service, .. } => {
                    assert_eq!(service, expected)
                }
                _ => panic!("unexpected intent"),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_requests() {
        let queue = RequestQueue::new();
        queue.queue(write_request("a")).unwrap();
        queue.queue(write_request("b")).unwrap();
        queue.shutdown();

        // Queued requests are still delivered after shutdown begins
        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_some());
        // ... and then the queue reports drained
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_queue_after_shutdown_is_rejected() {
        let queue = RequestQueue::new();
        queue.shutdown();
        assert!(queue.queue(write_request("a")).is_none());
    }
}
