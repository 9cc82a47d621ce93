//! Retry and dead-letter delivery core
//!
//! This crate provides functionality to:
//! - Validate work items before any delivery attempt
//! - Classify failures as permanent, transient or unknown
//! - Retry transient failures a bounded number of times with backoff
//! - Route failed items to a dead-letter channel with their provenance
//! - Triage dead letters without resending them or failing back into the channel
//!
//! [`DeliveryProcessor`] wires all of it onto a [`courier_queue::Broker`].

pub mod classifier;
mod dead_letter;
mod error;
mod executor;
mod manual_retry;
mod pipeline;
pub mod policy;
mod processor;
pub mod rate_limiter;
mod sent_log;
mod service;
mod transport;
mod triage;
pub mod validator;

pub use classifier::{AttemptOutcome, FailureKind, classify};
pub use dead_letter::{DeadLetterConfig, DeadLetterEnvelope, DeadLetterRouter};
pub use error::{
    DeliveryError, ManualRetryError, PipelineError, ProcessorError, RoutingError, SubmitError,
    TransportError, TriageError, ValidationError,
};
pub use executor::{DeliveryResult, Failure, RetryExecutor, RetryState};
pub use manual_retry::{ManualRetryRegistry, ManualRetryService};
pub use pipeline::{DeliveryPipeline, PipelineOutcome};
pub use policy::{Backoff, RetryPolicy};
pub use processor::{DeliveryProcessor, triage::TriageProcessor};
pub use sent_log::SentLog;
pub use service::SubmissionService;
pub use transport::{ScriptedTransport, Transport, TransportConfig, TransportStub};
pub use triage::{AlertSink, LogAlertSink, Severity, TriageAction, TriageConfig, TriageConsumer};
pub use validator::validate;
