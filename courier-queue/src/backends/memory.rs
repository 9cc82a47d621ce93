use std::{collections::VecDeque, sync::Arc};

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Location, QueueError, Record, r#trait::Broker};

/// Every in-memory topic has exactly one partition
const PARTITION: u32 = 0;

/// A consumer group's position within one topic
#[derive(Debug, Default)]
struct GroupCursor {
    /// Next never-delivered offset
    next: u64,
    in_flight: AHashSet<u64>,
    /// Released offsets, handed out again before `next`
    redeliver: VecDeque<u64>,
    /// Hand-out count per unacknowledged offset
    deliveries: AHashMap<u64, u32>,
}

#[derive(Debug, Default)]
struct TopicLog {
    records: Vec<Arc<[u8]>>,
    groups: AHashMap<String, GroupCursor>,
}

/// In-memory broker implementation
///
/// Each topic is an append-only log of records with a single partition. Consumer
/// groups keep independent cursors, so the primary consumer and the dead-letter
/// triage consumer never interfere even when subscribed to the same topic.
///
/// # Capacity Management
/// A per-topic capacity can be configured. Publishing to a full topic fails with
/// [`QueueError::CapacityExceeded`], which is useful for exercising dead-letter
/// routing failures.
///
/// # Concurrency
/// Topics live in a `DashMap`; operations on different topics do not contend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<DashMap<String, TopicLog>>,
    /// Maximum number of records per topic (None = unlimited)
    capacity: Option<usize>,
}

fn to_offset(index: usize) -> u64 {
    u64::try_from(index).unwrap_or(u64::MAX)
}

fn to_index(offset: u64) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX)
}

impl MemoryBroker {
    /// Create a new broker with unlimited topic capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new broker where every topic holds at most `capacity` records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Names of every topic that has been written to or polled
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.topics.iter().map(|t| t.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Drop every topic and cursor
    pub fn clear(&self) {
        self.topics.clear();
    }

    fn not_in_flight(group: &str, location: &Location) -> QueueError {
        QueueError::NotInFlight {
            group: group.to_string(),
            location: location.clone(),
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> crate::Result<Location> {
        let mut log = self.topics.entry(topic.to_string()).or_default();

        if let Some(capacity) = self.capacity
            && log.records.len() >= capacity
        {
            return Err(QueueError::CapacityExceeded {
                topic: topic.to_string(),
                capacity,
            });
        }

        let offset = to_offset(log.records.len());
        log.records.push(Arc::from(payload));

        Ok(Location::new(topic, PARTITION, offset))
    }

    async fn poll(&self, topic: &str, group: &str) -> crate::Result<Option<Record>> {
        let mut guard = self.topics.entry(topic.to_string()).or_default();
        let log: &mut TopicLog = &mut guard;
        let available = to_offset(log.records.len());
        let cursor = log.groups.entry(group.to_string()).or_default();

        let offset = if let Some(offset) = cursor.redeliver.pop_front() {
            offset
        } else if cursor.next < available {
            cursor.next += 1;
            cursor.next - 1
        } else {
            return Ok(None);
        };

        cursor.in_flight.insert(offset);
        let delivery_count = cursor.deliveries.entry(offset).or_insert(0);
        *delivery_count += 1;

        Ok(Some(Record {
            location: Location::new(topic, PARTITION, offset),
            payload: Arc::clone(&log.records[to_index(offset)]),
            delivery_count: *delivery_count,
        }))
    }

    async fn ack(&self, group: &str, location: &Location) -> crate::Result<()> {
        let mut log = self
            .topics
            .get_mut(&location.topic)
            .ok_or_else(|| Self::not_in_flight(group, location))?;
        let cursor = log
            .groups
            .get_mut(group)
            .ok_or_else(|| Self::not_in_flight(group, location))?;

        if !cursor.in_flight.remove(&location.offset) {
            return Err(Self::not_in_flight(group, location));
        }
        cursor.deliveries.remove(&location.offset);

        Ok(())
    }

    async fn release(&self, group: &str, location: &Location) -> crate::Result<()> {
        let mut log = self
            .topics
            .get_mut(&location.topic)
            .ok_or_else(|| Self::not_in_flight(group, location))?;
        let cursor = log
            .groups
            .get_mut(group)
            .ok_or_else(|| Self::not_in_flight(group, location))?;

        if !cursor.in_flight.remove(&location.offset) {
            return Err(Self::not_in_flight(group, location));
        }
        cursor.redeliver.push_back(location.offset);

        Ok(())
    }

    async fn read(&self, location: &Location) -> crate::Result<Record> {
        if location.partition != PARTITION {
            return Err(QueueError::NotFound(location.clone()));
        }

        self.topics
            .get(&location.topic)
            .and_then(|log| log.records.get(to_index(location.offset)).cloned())
            .map(|payload| Record {
                location: location.clone(),
                payload,
                delivery_count: 0,
            })
            .ok_or_else(|| QueueError::NotFound(location.clone()))
    }

    async fn len(&self, topic: &str) -> crate::Result<usize> {
        Ok(self.topics.get(topic).map_or(0, |log| log.records.len()))
    }

    async fn lag(&self, topic: &str, group: &str) -> crate::Result<u64> {
        let Some(log) = self.topics.get(topic) else {
            return Ok(0);
        };
        let written = to_offset(log.records.len());

        Ok(log.groups.get(group).map_or(written, |cursor| {
            written.saturating_sub(cursor.next)
                + to_offset(cursor.in_flight.len())
                + to_offset(cursor.redeliver.len())
        }))
    }
}
