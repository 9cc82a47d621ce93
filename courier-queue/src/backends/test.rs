use std::{sync::Arc, time::Duration};

use ahash::AHashSet;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::memory::MemoryBroker;
use crate::{Location, QueueError, Record, r#trait::Broker};

/// Testing utilities for the memory broker
///
/// Adds waiting for records to be published, reading whole topics for
/// assertions, and fault injection for publishing to specific topics.
#[derive(Debug, Clone, Default)]
pub struct TestBroker {
    inner: MemoryBroker,
    notify: Arc<Notify>,
    failing_topics: Arc<Mutex<AHashSet<String>>>,
}

impl TestBroker {
    /// Create a new test broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail with [`QueueError::Unavailable`]
    pub fn fail_publishes_to(&self, topic: &str) {
        self.failing_topics.lock().insert(topic.to_string());
    }

    /// Undo [`TestBroker::fail_publishes_to`]
    pub fn restore_publishes_to(&self, topic: &str) {
        self.failing_topics.lock().remove(topic);
    }

    /// Wait until `topic` holds at least `expected` records, with timeout
    ///
    /// # Errors
    /// Returns an error if the timeout is reached before the expected count
    pub async fn wait_for_count(
        &self,
        topic: &str,
        expected: usize,
        timeout: Duration,
    ) -> crate::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.inner.len(topic).await.unwrap_or_default() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| QueueError::Unavailable(format!("Timeout waiting for records: {e}")))
    }

    /// Every record on `topic`, in offset order (for test assertions)
    ///
    /// # Errors
    /// If a record cannot be read back from the inner broker
    pub async fn records(&self, topic: &str) -> crate::Result<Vec<Record>> {
        let len = self.inner.len(topic).await?;
        let mut records = Vec::with_capacity(len);
        for offset in 0..len {
            let location = Location::new(topic, 0, u64::try_from(offset).unwrap_or(u64::MAX));
            records.push(self.inner.read(&location).await?);
        }
        Ok(records)
    }

    /// Clear all topics
    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[async_trait]
impl Broker for TestBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> crate::Result<Location> {
        if self.failing_topics.lock().contains(topic) {
            return Err(QueueError::Unavailable(format!(
                "publishing to {topic} is disabled"
            )));
        }

        let location = self.inner.publish(topic, payload).await?;
        self.notify.notify_waiters();
        Ok(location)
    }

    async fn poll(&self, topic: &str, group: &str) -> crate::Result<Option<Record>> {
        self.inner.poll(topic, group).await
    }

    async fn ack(&self, group: &str, location: &Location) -> crate::Result<()> {
        self.inner.ack(group, location).await
    }

    async fn release(&self, group: &str, location: &Location) -> crate::Result<()> {
        self.inner.release(group, location).await
    }

    async fn read(&self, location: &Location) -> crate::Result<Record> {
        self.inner.read(location).await
    }

    async fn len(&self, topic: &str) -> crate::Result<usize> {
        self.inner.len(topic).await
    }

    async fn lag(&self, topic: &str, group: &str) -> crate::Result<u64> {
        self.inner.lag(topic, group).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fault_injection() {
        let broker = TestBroker::new();
        broker.fail_publishes_to("dead");

        let result = broker.publish("dead", b"x".to_vec()).await;
        assert!(matches!(result, Err(QueueError::Unavailable(_))));
        assert!(broker.publish("alive", b"x".to_vec()).await.is_ok());

        broker.restore_publishes_to("dead");
        assert!(broker.publish("dead", b"x".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_count() {
        let broker = TestBroker::new();
        let publisher = broker.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                publisher.publish("t", b"x".to_vec()).await.unwrap();
            }
        });

        broker
            .wait_for_count("t", 3, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(broker.records("t").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wait_for_count_times_out() {
        let broker = TestBroker::new();
        let result = broker
            .wait_for_count("t", 1, Duration::from_millis(20))
            .await;
        assert!(result.is_err());
    }
}
