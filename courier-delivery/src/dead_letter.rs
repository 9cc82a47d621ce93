//! Dead-letter envelopes and routing
//!
//! A request that fails permanently or exhausts its attempts is wrapped in a
//! [`DeadLetterEnvelope`] and published to `<source topic><suffix>`. The
//! envelope carries the original request together with where it came from and
//! why it failed.

use std::{error::Error, fmt::Write, sync::Arc};

use chrono::{DateTime, Utc};
use courier_common::{DeliveryRequest, audit, dead_letter};
use courier_queue::{Broker, Location, codec};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{FailureKind, error::RoutingError, executor::Failure};

fn default_topic_suffix() -> String {
    ".DLT".to_string()
}

/// Naming of the dead-letter channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeadLetterConfig {
    /// Appended to the source topic (and consumer group) name
    ///
    /// Default: `.DLT`
    #[serde(default = "default_topic_suffix")]
    pub topic_suffix: String,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            topic_suffix: default_topic_suffix(),
        }
    }
}

impl DeadLetterConfig {
    /// Dead-letter topic for records from `source_topic`
    #[must_use]
    pub fn topic_for(&self, source_topic: &str) -> String {
        format!("{source_topic}{}", self.topic_suffix)
    }

    /// Consumer group triaging the dead letters of `group_id`
    #[must_use]
    pub fn group_for(&self, group_id: &str) -> String {
        format!("{group_id}{}", self.topic_suffix)
    }
}

/// A failed request with its provenance
///
/// Immutable once created. Fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEnvelope {
    id: Ulid,
    original_request: DeliveryRequest,
    original_location: Location,
    failure_kind_name: String,
    failure_message: String,
    failure_detail: String,
    attempts: u32,
    dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEnvelope {
    /// Wrap a failure
    #[must_use]
    pub fn new(
        original_request: DeliveryRequest,
        original_location: Location,
        failure: &Failure,
    ) -> Self {
        Self::with_kind_name(
            original_request,
            original_location,
            failure.kind.as_str(),
            failure,
        )
    }

    /// Wrap a failure under an explicit kind name
    ///
    /// Envelopes written by other producers may carry names this version does
    /// not know; triage must still handle them.
    #[must_use]
    pub fn with_kind_name(
        original_request: DeliveryRequest,
        original_location: Location,
        failure_kind_name: impl Into<String>,
        failure: &Failure,
    ) -> Self {
        Self {
            id: Ulid::new(),
            original_request,
            original_location,
            failure_kind_name: failure_kind_name.into(),
            failure_message: failure.error.to_string(),
            failure_detail: failure_detail(&failure.error),
            attempts: failure.attempts,
            dead_lettered_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Ulid {
        self.id
    }

    #[must_use]
    pub const fn original_request(&self) -> &DeliveryRequest {
        &self.original_request
    }

    #[must_use]
    pub const fn original_location(&self) -> &Location {
        &self.original_location
    }

    #[must_use]
    pub fn failure_kind_name(&self) -> &str {
        &self.failure_kind_name
    }

    /// The recorded kind, or `None` if the name is not recognised
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure_kind_name.parse().ok()
    }

    #[must_use]
    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    #[must_use]
    pub fn failure_detail(&self) -> &str {
        &self.failure_detail
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn dead_lettered_at(&self) -> DateTime<Utc> {
        self.dead_lettered_at
    }
}

/// Debug rendering of an error followed by its source chain
fn failure_detail(error: &(dyn Error + 'static)) -> String {
    let mut detail = format!("{error:?}");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(detail, "\ncaused by: {cause}");
        source = cause.source();
    }
    detail
}

/// Publishes envelopes to the dead-letter channel
#[derive(Debug, Clone)]
pub struct DeadLetterRouter {
    broker: Arc<dyn Broker>,
    config: DeadLetterConfig,
}

impl DeadLetterRouter {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, config: DeadLetterConfig) -> Self {
        Self { broker, config }
    }

    #[must_use]
    pub const fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    /// Dead-letter `request`, returning once the broker has accepted the write
    ///
    /// # Errors
    /// [`RoutingError`] when the envelope cannot be encoded or published. The
    /// caller must then leave the source record unacknowledged.
    pub async fn route(
        &self,
        request: &DeliveryRequest,
        failure: &Failure,
        original_location: &Location,
    ) -> Result<DeadLetterEnvelope, RoutingError> {
        let envelope = DeadLetterEnvelope::new(request.clone(), original_location.clone(), failure);
        self.publish(envelope).await
    }

    /// Publish an already built envelope
    ///
    /// # Errors
    /// See [`DeadLetterRouter::route`].
    pub async fn publish(
        &self,
        envelope: DeadLetterEnvelope,
    ) -> Result<DeadLetterEnvelope, RoutingError> {
        let topic = self.config.topic_for(&envelope.original_location.topic);
        let payload = codec::encode(&envelope).map_err(RoutingError::Encode)?;

        let location = match self.broker.publish(&topic, payload).await {
            Ok(location) => location,
            Err(source) => {
                dead_letter!(
                    level = ERROR,
                    alert = "OPERATIONAL",
                    envelope_id = %envelope.id,
                    original = %envelope.original_location,
                    topic = %topic,
                    error = %source,
                    "Failed to publish dead letter, source record left for redelivery"
                );
                return Err(RoutingError::Publish { topic, source });
            }
        };

        dead_letter!(
            level = INFO,
            envelope_id = %envelope.id,
            original = %envelope.original_location,
            location = %location,
            failure_kind = %envelope.failure_kind_name,
            "Dead-lettered request"
        );
        audit::log_dead_lettered(
            &envelope.original_location.to_string(),
            envelope.original_request.recipient(),
            &envelope.failure_kind_name,
            &envelope.failure_message,
            envelope.attempts,
        );

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use courier_queue::TestBroker;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{TransportError, ValidationError};

    fn transient() -> Failure {
        Failure {
            error: TransportError::ServerUnavailable("busy".to_string()).into(),
            kind: FailureKind::Transient,
            attempts: 3,
        }
    }

    #[test]
    fn test_names() {
        let config = DeadLetterConfig::default();
        assert_eq!(config.topic_for("email-send-requests"), "email-send-requests.DLT");
        assert_eq!(config.group_for("email-service"), "email-service.DLT");

        let config: DeadLetterConfig = ron::from_str(r#"(topic_suffix: "-dead")"#).unwrap();
        assert_eq!(config.topic_for("in"), "in-dead");
    }

    #[test]
    fn test_envelope_carries_provenance() {
        let request = DeliveryRequest::new("a@b.com").with_body("hi");
        let location = Location::new("email-send-requests", 0, 7);
        let envelope = DeadLetterEnvelope::new(request.clone(), location.clone(), &transient());

        assert_eq!(envelope.original_request(), &request);
        assert_eq!(envelope.original_location(), &location);
        assert_eq!(envelope.failure_kind_name(), "Transient");
        assert_eq!(envelope.failure_kind(), Some(FailureKind::Transient));
        assert_eq!(
            envelope.failure_message(),
            "Transport failure: Server unavailable: busy"
        );
        assert_eq!(envelope.attempts(), 3);
    }

    #[test]
    fn test_failure_detail_includes_sources() {
        let failure = Failure::before_attempt(ValidationError::MissingAddress);
        let envelope =
            DeadLetterEnvelope::new(DeliveryRequest::default(), Location::new("t", 0, 0), &failure);

        assert!(envelope.failure_detail().starts_with("Invalid(MissingAddress)"));
        assert!(
            envelope
                .failure_detail()
                .contains("caused by: Recipient address is missing")
        );
        assert_eq!(envelope.attempts(), 0);
    }

    #[test]
    fn test_unrecognised_kind_name() {
        let envelope = DeadLetterEnvelope::with_kind_name(
            DeliveryRequest::new("a@b.com"),
            Location::new("t", 0, 0),
            "Catastrophic",
            &transient(),
        );
        assert_eq!(envelope.failure_kind(), None);
    }

    #[tokio::test]
    async fn test_route_publishes_envelope() {
        let broker = TestBroker::new();
        let router = DeadLetterRouter::new(Arc::new(broker.clone()), DeadLetterConfig::default());
        let location = Location::new("email-send-requests", 0, 3);

        let envelope = router
            .route(&DeliveryRequest::new("a@b.com"), &transient(), &location)
            .await
            .unwrap();

        let records = broker.records("email-send-requests.DLT").await.unwrap();
        assert_eq!(records.len(), 1);
        let published: DeadLetterEnvelope = codec::decode(&records[0].payload).unwrap();
        assert_eq!(published, envelope);
    }

    #[tokio::test]
    async fn test_route_failure_propagates() {
        let broker = TestBroker::new();
        broker.fail_publishes_to("email-send-requests.DLT");
        let router = DeadLetterRouter::new(Arc::new(broker.clone()), DeadLetterConfig::default());

        let result = router
            .route(
                &DeliveryRequest::new("a@b.com"),
                &transient(),
                &Location::new("email-send-requests", 0, 3),
            )
            .await;

        assert!(matches!(result, Err(RoutingError::Publish { topic, .. }) if topic == "email-send-requests.DLT"));
        assert_eq!(broker.len("email-send-requests.DLT").await.unwrap(), 0);
    }
}
