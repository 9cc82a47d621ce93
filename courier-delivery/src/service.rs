//! Request submission
//!
//! The synchronous half of intake: a malformed request is rejected straight
//! back to the caller, anything else is enqueued and handled asynchronously.

use std::sync::Arc;

use courier_common::{DeliveryRequest, delivery};
use courier_queue::{Broker, Location, codec};

use crate::{error::SubmitError, validator::validate};

#[derive(Debug, Clone)]
pub struct SubmissionService {
    broker: Arc<dyn Broker>,
    topic: String,
}

impl SubmissionService {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    /// Validate and enqueue a request
    ///
    /// # Errors
    /// [`SubmitError::Invalid`] for a malformed request, in which case nothing
    /// is published. [`SubmitError::Enqueue`] if the broker refuses the write.
    pub async fn submit(&self, request: &DeliveryRequest) -> Result<Location, SubmitError> {
        if let Err(error) = validate(request) {
            delivery!(
                level = INFO,
                error = %error,
                "Rejected submission"
            );
            return Err(error.into());
        }

        let location = self
            .broker
            .publish(&self.topic, codec::encode(request)?)
            .await?;

        delivery!(
            level = DEBUG,
            location = %location,
            "Accepted submission"
        );
        Ok(location)
    }
}
