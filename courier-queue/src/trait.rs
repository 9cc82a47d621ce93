use async_trait::async_trait;

use crate::{Location, Record, Result};

/// A topic-based message channel with consumer groups.
///
/// Implementations must be safe to share between workers: publishing and
/// consuming may happen concurrently from any number of tasks, with no
/// ordering guarantee between callers.
///
/// Consumption is at-least-once. [`Broker::poll`] hands out the next record for
/// a group and marks it in flight; the consumer then either
/// [`ack`](Broker::ack)s it once processing is finished, or
/// [`release`](Broker::release)s it so it will be handed out again.
#[async_trait]
pub trait Broker: Send + Sync + std::fmt::Debug {
    /// Durably append a record to a topic, returning where it was written.
    ///
    /// A successful return means the record is enqueued.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Location>;

    /// Hand out the next record for `group` on `topic`, if any.
    ///
    /// Released records are handed out before new ones.
    async fn poll(&self, topic: &str, group: &str) -> Result<Option<Record>>;

    /// Mark an in-flight record as finished for `group`.
    async fn ack(&self, group: &str, location: &Location) -> Result<()>;

    /// Return an in-flight record to `group` for redelivery.
    async fn release(&self, group: &str, location: &Location) -> Result<()>;

    /// Read a record without affecting any group's position.
    async fn read(&self, location: &Location) -> Result<Record>;

    /// Number of records ever written to `topic`.
    async fn len(&self, topic: &str) -> Result<usize>;

    /// Number of records on `topic` that `group` has not yet acknowledged.
    async fn lag(&self, topic: &str, group: &str) -> Result<u64>;
}
