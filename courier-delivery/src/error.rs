//! Typed error handling for the delivery pipeline.
//!
//! [`DeliveryError`] is what a single attempt can fail with. It is classified
//! into a [`FailureKind`](crate::FailureKind) by
//! [`classify`](crate::classifier::classify):
//! - Validation and malformed input: permanent, never retried
//! - Connection level and downstream availability: transient, retried with backoff
//! - Anything else: unknown, retried but flagged for triage
//!
//! The remaining types describe failures of the pipeline around the attempts.

use std::time::Duration;

use courier_queue::QueueError;
use thiserror::Error;
use ulid::Ulid;

/// Failure of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The request failed validation.
    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationError),

    /// The record payload could not be decoded into a request.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// The downstream transport refused or failed the send.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Anything the pipeline did not anticipate.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

/// Request validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Recipient address is missing")]
    MissingAddress,

    #[error("Recipient address is not a valid email address: {0}")]
    InvalidAddress(String),
}

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not reach the downstream service.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The downstream service is up but not currently accepting work.
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// The downstream service did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The downstream service refused this specific message.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A failure the transport could not categorise.
    #[error("{0}")]
    Other(String),
}

/// Failure to publish to the dead-letter channel.
///
/// This is never swallowed: the source record must stay unacknowledged so the
/// broker redelivers it.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Failed to encode dead-letter envelope: {0}")]
    Encode(#[source] QueueError),

    #[error("Failed to publish to dead-letter topic {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: QueueError,
    },
}

/// Why a record could not be carried to a final outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Cancellation arrived while waiting between attempts.
    #[error("Processing cancelled during backoff")]
    Cancelled,

    /// The record failed and could not be dead-lettered.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Failures while carrying out a triage action.
///
/// Caught by the triage consumer and raised as a critical alert, never
/// propagated back to the dead-letter channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriageError {
    #[error("Alert dispatch failed: {0}")]
    Alert(String),

    #[error("Manual retry registry is full ({capacity} entries)")]
    RegistryFull { capacity: usize },
}

/// Synchronous rejection of a submitted request.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The client sent a malformed request; nothing was published.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The request was valid but could not be enqueued.
    #[error("Failed to enqueue request: {0}")]
    Enqueue(#[from] QueueError),
}

/// Failures of an operator-initiated resend.
#[derive(Debug, Error)]
pub enum ManualRetryError {
    #[error("No flagged envelope with id {0}")]
    NotFound(Ulid),

    #[error("Manual retries are rate limited, try again in {0:?}")]
    RateLimited(Duration),

    #[error("Failed to republish request: {0}")]
    Publish(#[from] QueueError),
}

/// Failures starting or running the processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Delivery processor not initialized: {0}")]
    NotInitialized(String),

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanic { worker: String, message: String },
}

impl SubmitError {
    /// Returns `true` if the client is at fault and should not resubmit as-is.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

impl ManualRetryError {
    /// Returns `true` if the same resend may succeed later.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::RateLimited(_))
            || matches!(self, Self::Publish(error) if error.is_transient())
    }
}
