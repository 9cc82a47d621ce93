use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{Record, Result, r#trait::Broker};

const fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

/// A consumer group's view of one topic
///
/// Cloning a subscription shares the group: clones compete for records, which
/// is how several workers split one topic between them.
#[derive(Debug, Clone)]
pub struct Subscription {
    broker: Arc<dyn Broker>,
    topic: String,
    group: String,
    poll_interval: Duration,
}

impl Subscription {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            group: group.into(),
            poll_interval: default_poll_interval(),
        }
    }

    /// How long to wait before polling again when the topic is drained
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Wait for the next record
    ///
    /// Returns `Ok(None)` once `cancel` fires. Nothing is handed out after
    /// cancellation, so no record is left in flight by a cancelled wait.
    pub async fn next(&self, cancel: &CancellationToken) -> Result<Option<Record>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if let Some(record) = self.broker.poll(&self.topic, &self.group).await? {
                return Ok(Some(record));
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Processing of `record` is finished
    pub async fn ack(&self, record: &Record) -> Result<()> {
        self.broker.ack(&self.group, &record.location).await
    }

    /// Hand `record` back to the group for redelivery
    pub async fn release(&self, record: &Record) -> Result<()> {
        self.broker.release(&self.group, &record.location).await
    }
}
