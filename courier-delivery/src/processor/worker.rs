//! Delivery worker loop

use std::{sync::Arc, time::Duration};

use courier_common::{internal, tracing};
use courier_queue::Subscription;
use tokio_util::sync::CancellationToken;

use crate::{DeliveryPipeline, error::PipelineError, pipeline::PipelineOutcome};

/// Take one record at a time from `subscription` and carry it to a final
/// outcome, until `cancel` fires
///
/// Records are acknowledged only after they were delivered or dead-lettered.
/// A record cancelled mid-backoff or whose dead letter could not be published
/// is released for redelivery.
pub async fn run(
    worker: usize,
    subscription: Subscription,
    pipeline: Arc<DeliveryPipeline>,
    pause: Duration,
    cancel: CancellationToken,
) {
    internal!(level = DEBUG, worker, topic = %subscription.topic(), "Delivery worker starting");

    loop {
        let record = match subscription.next(&cancel).await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(worker, error = %error, "Failed to poll for work");
                if paused_until_cancelled(pause, &cancel).await {
                    break;
                }
                continue;
            }
        };

        if record.is_redelivery() {
            internal!(
                level = DEBUG,
                worker,
                location = %record.location,
                delivery_count = record.delivery_count,
                "Processing redelivered record"
            );
        }

        match pipeline.process(&record, &cancel).await {
            Ok(outcome) => {
                if let PipelineOutcome::Delivered { attempts } = outcome {
                    internal!(worker, location = %record.location, attempts, "Record delivered");
                }
                if let Err(error) = subscription.ack(&record).await {
                    tracing::error!(
                        worker,
                        location = %record.location,
                        error = %error,
                        "Failed to acknowledge record"
                    );
                }
            }
            Err(PipelineError::Cancelled) => {
                release(worker, &subscription, &record).await;
                break;
            }
            Err(PipelineError::Routing(error)) => {
                tracing::error!(
                    alert = "OPERATIONAL",
                    worker,
                    location = %record.location,
                    error = %error,
                    "Dead-letter routing failed, record released for redelivery"
                );
                release(worker, &subscription, &record).await;
                if paused_until_cancelled(pause, &cancel).await {
                    break;
                }
            }
        }
    }

    internal!(level = DEBUG, worker, "Delivery worker stopped");
}

async fn release(worker: usize, subscription: &Subscription, record: &courier_queue::Record) {
    if let Err(error) = subscription.release(record).await {
        tracing::error!(
            worker,
            location = %record.location,
            error = %error,
            "Failed to release record"
        );
    }
}

/// Wait `pause`; returns `true` if cancelled first
async fn paused_until_cancelled(pause: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(pause) => false,
    }
}
