//! One record, start to finish
//!
//! Validator, then retry executor, then dead-letter router, strictly in that
//! order for each record.

use courier_common::{DeliveryRequest, audit, delivery};
use courier_queue::{Location, Record, codec};
use tokio_util::sync::CancellationToken;

use crate::{
    DeadLetterEnvelope, DeadLetterRouter, RetryExecutor, SentLog,
    error::{DeliveryError, PipelineError},
    executor::{DeliveryResult, Failure},
    validator::validate,
};

/// Final state of a processed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Delivered { attempts: u32 },
    DeadLettered(DeadLetterEnvelope),
}

#[derive(Debug, Clone)]
pub struct DeliveryPipeline {
    executor: RetryExecutor,
    router: DeadLetterRouter,
    sent: SentLog,
}

impl DeliveryPipeline {
    #[must_use]
    pub const fn new(executor: RetryExecutor, router: DeadLetterRouter, sent: SentLog) -> Self {
        Self {
            executor,
            router,
            sent,
        }
    }

    #[must_use]
    pub const fn sent_log(&self) -> &SentLog {
        &self.sent
    }

    /// Decode and process a consumed record
    ///
    /// A payload that does not decode is dead-lettered as a permanent failure
    /// with an empty request.
    ///
    /// # Errors
    /// [`PipelineError::Cancelled`] when cancelled between attempts and
    /// [`PipelineError::Routing`] when a failure could not be dead-lettered.
    /// In both cases the record must not be acknowledged.
    pub async fn process(
        &self,
        record: &Record,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        match codec::decode::<DeliveryRequest>(&record.payload) {
            Ok(request) => self.process_request(&request, &record.location, cancel).await,
            Err(error) => {
                delivery!(
                    level = WARN,
                    location = %record.location,
                    error = %error,
                    "Undecodable request payload"
                );
                let failure = Failure::before_attempt(DeliveryError::Malformed(error.to_string()));
                let envelope = self
                    .router
                    .route(&DeliveryRequest::default(), &failure, &record.location)
                    .await?;
                Ok(PipelineOutcome::DeadLettered(envelope))
            }
        }
    }

    /// Process a request that came from `location`
    ///
    /// # Errors
    /// See [`DeliveryPipeline::process`].
    pub async fn process_request(
        &self,
        request: &DeliveryRequest,
        location: &Location,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let reference = location.to_string();

        let failure = match validate(request) {
            Err(error) => {
                delivery!(
                    level = WARN,
                    request = %reference,
                    error = %error,
                    "Request failed validation"
                );
                Failure::before_attempt(error)
            }
            Ok(address) => match self.executor.execute_as(&reference, request, cancel).await? {
                DeliveryResult::Delivered { attempts } => {
                    self.sent.record(address);
                    audit::log_delivery_success(&reference, address, attempts);
                    return Ok(PipelineOutcome::Delivered { attempts });
                }
                DeliveryResult::Failed(failure) => failure,
            },
        };

        let envelope = self.router.route(request, &failure, location).await?;
        Ok(PipelineOutcome::DeadLettered(envelope))
    }
}
