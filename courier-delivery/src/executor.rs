//! Bounded retry loop around a [`Transport`]

use std::sync::Arc;

use courier_common::{DeliveryRequest, audit, delivery};
use tokio_util::sync::CancellationToken;

use crate::{
    FailureKind, RetryPolicy, Transport,
    classifier::{AttemptOutcome, classify},
    error::{DeliveryError, PipelineError},
};

/// Progress of one executor invocation
///
/// Created fresh for every request and dropped when the invocation returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt_count: u32,
    last_failure: Option<AttemptOutcome>,
}

impl RetryState {
    /// Attempts made so far (the current one included)
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub const fn last_failure(&self) -> Option<&AttemptOutcome> {
        self.last_failure.as_ref()
    }

    const fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    fn record_failure(&mut self, error: &DeliveryError) {
        self.last_failure = Some(AttemptOutcome::failure(error));
    }
}

/// A request the executor gave up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The error from the last attempt
    pub error: DeliveryError,
    pub kind: FailureKind,
    /// Attempts made; zero when the request never reached the transport
    pub attempts: u32,
}

impl Failure {
    /// A request rejected before any attempt
    #[must_use]
    pub fn before_attempt(error: impl Into<DeliveryError>) -> Self {
        let error = error.into();
        Self {
            kind: classify(&error),
            error,
            attempts: 0,
        }
    }
}

/// Final result of [`RetryExecutor::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered { attempts: u32 },
    Failed(Failure),
}

/// Drives delivery attempts for one request at a time
///
/// Holds no per-request state; one executor is shared by every worker.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy, transport: Arc<dyn Transport>) -> Self {
        Self { policy, transport }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempt delivery until success, a non-retryable failure, or exhaustion
    ///
    /// # Errors
    /// [`PipelineError::Cancelled`] if `cancel` fires while waiting between
    /// attempts. Nothing should be dead-lettered in that case.
    pub async fn execute(
        &self,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> Result<DeliveryResult, PipelineError> {
        self.execute_as("-", request, cancel).await
    }

    /// As [`RetryExecutor::execute`], tagging audit events with `reference`
    ///
    /// # Errors
    /// [`PipelineError::Cancelled`] if `cancel` fires while waiting between
    /// attempts.
    pub async fn execute_as(
        &self,
        reference: &str,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> Result<DeliveryResult, PipelineError> {
        let mut state = RetryState::default();

        loop {
            let attempt = state.begin_attempt();
            audit::log_delivery_attempt(reference, request.recipient(), attempt);

            let error = match self.transport.send(request).await {
                Ok(()) => {
                    delivery!(
                        level = DEBUG,
                        request = %reference,
                        attempt,
                        "Delivery succeeded"
                    );
                    return Ok(DeliveryResult::Delivered { attempts: attempt });
                }
                Err(error) => error,
            };

            state.record_failure(&error);
            let kind = classify(&error);

            if !self.policy.is_retryable(kind) {
                delivery!(
                    level = WARN,
                    request = %reference,
                    attempt,
                    failure_kind = %kind,
                    error = %error,
                    "Non-retryable failure, giving up"
                );
                return Ok(DeliveryResult::Failed(Failure {
                    error,
                    kind,
                    attempts: attempt,
                }));
            }

            if !self.policy.should_retry(attempt) {
                delivery!(
                    level = WARN,
                    request = %reference,
                    attempt,
                    failure_kind = %kind,
                    error = %error,
                    "Attempts exhausted"
                );
                return Ok(DeliveryResult::Failed(Failure {
                    error,
                    kind,
                    attempts: attempt,
                }));
            }

            let delay = self.policy.delay_after(attempt);
            delivery!(
                level = INFO,
                request = %reference,
                attempt,
                remaining = self.policy.remaining_attempts(attempt),
                failure_kind = %kind,
                error = %error,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Attempt failed, backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    delivery!(
                        level = INFO,
                        request = %reference,
                        attempt,
                        "Cancelled during backoff"
                    );
                    return Err(PipelineError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
