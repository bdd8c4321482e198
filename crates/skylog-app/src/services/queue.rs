//! Work queue capability carrying per-page analyze tasks.
//!
//! Production fronts a visibility-timeout queue with a dead-letter policy;
//! the capability here is just send/receive of the JSON message. The
//! in-memory implementation drives the local pipeline runner and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One queued page awaiting analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTask {
    pub upload_id: Uuid,
    pub page_id: Uuid,
    pub page_number: u32,
    pub s3_key: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode queue message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode queue message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, task: &PageTask) -> Result<(), QueueError>;

    /// Pop the next task, or `None` when the queue is drained.
    async fn receive(&self) -> Result<Option<PageTask>, QueueError>;
}

/// FIFO queue holding messages in their JSON wire form so the round trip is
/// exercised even locally.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    messages: Mutex<VecDeque<String>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn send(&self, task: &PageTask) -> Result<(), QueueError> {
        let body = serde_json::to_string(task).map_err(QueueError::Encode)?;
        if let Ok(mut queue) = self.messages.lock() {
            queue.push_back(body);
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<PageTask>, QueueError> {
        let body = match self.messages.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        match body {
            Some(body) => serde_json::from_str(&body).map(Some).map_err(QueueError::Decode),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tasks_round_trip_in_fifo_order() {
        let queue = InMemoryQueue::new();
        let first = PageTask {
            upload_id: Uuid::new_v4(),
            page_id: Uuid::new_v4(),
            page_number: 1,
            s3_key: "pages/b/page_0001.jpg".into(),
        };
        let second = PageTask {
            page_number: 2,
            s3_key: "pages/b/page_0002.jpg".into(),
            ..first.clone()
        };

        queue.send(&first).await.expect("send");
        queue.send(&second).await.expect("send");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.receive().await.expect("receive"), Some(first));
        assert_eq!(queue.receive().await.expect("receive"), Some(second));
        assert_eq!(queue.receive().await.expect("receive"), None);
    }

    #[test]
    fn message_wire_format_is_camel_case() {
        let task = PageTask {
            upload_id: Uuid::nil(),
            page_id: Uuid::nil(),
            page_number: 7,
            s3_key: "pages/b/page_0007.jpg".into(),
        };
        let json = serde_json::to_value(&task).expect("serialize");
        assert!(json.get("uploadId").is_some());
        assert!(json.get("pageId").is_some());
        assert_eq!(json["pageNumber"], 7);
        assert_eq!(json["s3Key"], "pages/b/page_0007.jpg");
    }
}
