//! Dead-letter triage loop

use std::{sync::Arc, time::Duration};

use courier_common::{internal, tracing};
use courier_queue::{Subscription, codec};
use tokio_util::sync::CancellationToken;

use crate::{DeadLetterEnvelope, TriageConsumer};

/// Consumes the dead-letter topic and triages every envelope
///
/// Every record is acknowledged once looked at, including ones that fail to
/// decode or whose triage panics. Nothing is ever published from here.
#[derive(Debug, Clone)]
pub struct TriageProcessor {
    subscription: Subscription,
    consumer: Arc<TriageConsumer>,
    pause: Duration,
}

impl TriageProcessor {
    #[must_use]
    pub const fn new(subscription: Subscription, consumer: Arc<TriageConsumer>) -> Self {
        Self {
            subscription,
            consumer,
            pause: Duration::from_secs(1),
        }
    }

    /// How long to back off after the broker fails a poll
    #[must_use]
    pub const fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        internal!(
            level = DEBUG,
            topic = %self.subscription.topic(),
            group = %self.subscription.group(),
            "Triage processor starting"
        );

        loop {
            let record = match self.subscription.next(&cancel).await {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(error = %error, "Failed to poll dead-letter topic");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.pause) => continue,
                    }
                }
            };

            match codec::decode::<DeadLetterEnvelope>(&record.payload) {
                Ok(envelope) => {
                    let consumer = Arc::clone(&self.consumer);
                    let id = envelope.id();
                    let triaged =
                        tokio::spawn(async move { consumer.triage(&envelope).await }).await;

                    if let Err(error) = triaged {
                        tracing::error!(
                            alert = "CRITICAL",
                            envelope_id = %id,
                            location = %record.location,
                            error = %error,
                            "Dead-letter triage aborted"
                        );
                    }
                }
                Err(error) => {
                    tracing::error!(
                        alert = "CRITICAL",
                        location = %record.location,
                        error = %error,
                        "Undecodable dead-letter record"
                    );
                }
            }

            if let Err(error) = self.subscription.ack(&record).await {
                tracing::error!(
                    location = %record.location,
                    error = %error,
                    "Failed to acknowledge dead-letter record"
                );
            }
        }

        internal!(level = DEBUG, "Triage processor stopped");
    }
}
