//! Operator-initiated resends of dead-lettered requests
//!
//! Triage only flags transient failures into the [`ManualRetryRegistry`]. A
//! resend happens when someone calls [`ManualRetryService::resend`], which is
//! rate limited separately from the main pipeline.

use std::sync::Arc;

use ahash::RandomState;
use courier_common::dead_letter;
use courier_queue::{Broker, Location, codec};
use dashmap::DashMap;
use ulid::Ulid;

use crate::{
    DeadLetterEnvelope,
    error::{ManualRetryError, TriageError},
    rate_limiter::{RateLimitConfig, RateLimiter},
};

/// Envelopes waiting for an operator, keyed by envelope id
#[derive(Debug, Clone, Default)]
pub struct ManualRetryRegistry {
    entries: Arc<DashMap<Ulid, DeadLetterEnvelope, RandomState>>,
    capacity: Option<usize>,
}

impl ManualRetryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that refuses new entries beyond `capacity`
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Flag an envelope for manual retry
    ///
    /// Flagging the same envelope again is a no-op.
    ///
    /// # Errors
    /// [`TriageError::RegistryFull`] when the capacity is reached
    pub fn flag(&self, envelope: &DeadLetterEnvelope) -> Result<(), TriageError> {
        if self.entries.contains_key(&envelope.id()) {
            return Ok(());
        }

        if let Some(capacity) = self.capacity
            && self.entries.len() >= capacity
        {
            return Err(TriageError::RegistryFull { capacity });
        }

        self.entries.insert(envelope.id(), envelope.clone());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: Ulid) -> Option<DeadLetterEnvelope> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Every flagged envelope, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<DeadLetterEnvelope> {
        let mut envelopes: Vec<_> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        envelopes.sort_by_key(DeadLetterEnvelope::id);
        envelopes
    }

    pub fn remove(&self, id: Ulid) -> Option<DeadLetterEnvelope> {
        self.entries.remove(&id).map(|(_, envelope)| envelope)
    }

    /// Put back an entry claimed by a resend that failed, ignoring capacity
    pub(crate) fn restore(&self, envelope: DeadLetterEnvelope) {
        self.entries.entry(envelope.id()).or_insert(envelope);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Republishes flagged requests to their source topic
#[derive(Debug, Clone)]
pub struct ManualRetryService {
    registry: ManualRetryRegistry,
    broker: Arc<dyn Broker>,
    limiter: Arc<RateLimiter>,
}

impl ManualRetryService {
    #[must_use]
    pub fn new(
        registry: ManualRetryRegistry,
        broker: Arc<dyn Broker>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            registry,
            broker,
            limiter: Arc::new(RateLimiter::new(rate_limit)),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &ManualRetryRegistry {
        &self.registry
    }

    /// Resend the original request of flagged envelope `id`
    ///
    /// The entry is claimed before publishing, so concurrent resends of one
    /// id publish at most once. A failed publish puts the entry back.
    ///
    /// # Errors
    /// [`ManualRetryError::NotFound`] if nothing is flagged under `id`,
    /// [`ManualRetryError::RateLimited`] when resends are arriving too fast,
    /// [`ManualRetryError::Publish`] when the broker refuses the write.
    pub async fn resend(&self, id: Ulid) -> Result<Location, ManualRetryError> {
        if self.registry.get(id).is_none() {
            return Err(ManualRetryError::NotFound(id));
        }

        self.limiter
            .check_rate_limit()
            .map_err(ManualRetryError::RateLimited)?;

        let envelope = self.registry.remove(id).ok_or(ManualRetryError::NotFound(id))?;

        let location = match self.republish(&envelope).await {
            Ok(location) => location,
            Err(error) => {
                self.registry.restore(envelope);
                return Err(error);
            }
        };

        dead_letter!(
            level = INFO,
            envelope_id = %id,
            original = %envelope.original_location(),
            location = %location,
            "Manually resent dead-lettered request"
        );

        Ok(location)
    }

    async fn republish(&self, envelope: &DeadLetterEnvelope) -> Result<Location, ManualRetryError> {
        let payload = codec::encode(envelope.original_request())?;
        let topic = &envelope.original_location().topic;
        Ok(self.broker.publish(topic, payload).await?)
    }
}
