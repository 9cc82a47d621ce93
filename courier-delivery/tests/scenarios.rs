//! Processor scenarios against an in-memory broker with a paused clock
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::time::Duration;

use courier_common::DeliveryRequest;
use courier_delivery::{
    DeadLetterEnvelope, FailureKind, RetryPolicy, ScriptedTransport, Severity, SubmitError,
    TransportError, ValidationError,
};
use courier_queue::{Broker, TestBroker, codec};
use pretty_assertions::assert_eq;
use support::{DEAD_LETTERS, GROUP, Harness, SOURCE, eventually};

const WAIT: Duration = Duration::from_secs(60);

async fn dead_letters(broker: &TestBroker) -> Vec<DeadLetterEnvelope> {
    broker
        .records(DEAD_LETTERS)
        .await
        .unwrap()
        .iter()
        .map(|record| codec::decode(&record.payload).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_malformed_submission_is_rejected_without_publishing() {
    let harness = Harness::start(ScriptedTransport::new(), RetryPolicy::default());
    let intake = harness.processor.submission_service().unwrap();

    let result = intake.submit(&DeliveryRequest::new("not-an-email")).await;

    assert!(matches!(
        result,
        Err(SubmitError::Invalid(ValidationError::InvalidAddress(_)))
    ));
    assert!(result.unwrap_err().is_client_error());
    assert_eq!(harness.broker.len(SOURCE).await.unwrap(), 0);
    assert_eq!(harness.transport.calls(), 0);

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_then_dead_letter_and_flag() {
    let transport =
        ScriptedTransport::always_failing(TransportError::ServerUnavailable("busy".to_string()));
    let harness = Harness::start(
        transport,
        RetryPolicy::fixed(3, Duration::from_millis(1000)),
    );
    let intake = harness.processor.submission_service().unwrap();
    let manual = harness.processor.manual_retry_service().unwrap();

    let start = tokio::time::Instant::now();
    let location = intake
        .submit(&DeliveryRequest::new("user@example.com").with_body("hello"))
        .await
        .unwrap();

    harness
        .broker
        .wait_for_count(DEAD_LETTERS, 1, WAIT)
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(2000));

    let envelopes = dead_letters(&harness.broker).await;
    assert_eq!(envelopes.len(), 1);
    let envelope = &envelopes[0];
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Transient));
    assert_eq!(envelope.attempts(), 3);
    assert_eq!(envelope.original_location(), &location);
    assert_eq!(envelope.original_request().recipient(), "user@example.com");
    assert_eq!(harness.transport.calls(), 3);

    eventually(WAIT, async || manual.registry().len() == 1).await;
    assert_eq!(manual.registry().list()[0].id(), envelope.id());
    assert_eq!(harness.alerts.count(), 0);

    eventually(WAIT, async || harness.broker.lag(SOURCE, GROUP).await.unwrap() == 0).await;
    // Triage never resends on its own
    assert_eq!(harness.broker.len(SOURCE).await.unwrap(), 1);

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_attempted_once_and_alerted() {
    let transport =
        ScriptedTransport::always_failing(TransportError::Rejected("mailbox closed".to_string()));
    let harness = Harness::start(transport, RetryPolicy::fixed(5, Duration::from_secs(1)));
    let intake = harness.processor.submission_service().unwrap();

    intake
        .submit(&DeliveryRequest::new("user@example.com"))
        .await
        .unwrap();

    harness
        .broker
        .wait_for_count(DEAD_LETTERS, 1, WAIT)
        .await
        .unwrap();
    let envelope = dead_letters(&harness.broker).await.remove(0);
    assert_eq!(envelope.failure_kind_name(), "Permanent");
    assert_eq!(envelope.attempts(), 1);
    assert_eq!(harness.transport.calls(), 1);

    eventually(WAIT, async || harness.alerts.count() == 1).await;
    let (severity, alerted) = harness.alerts.alerts().remove(0);
    assert_eq!(severity, Severity::High);
    assert_eq!(alerted, envelope);

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_record_on_topic_is_dead_lettered_without_attempts() {
    let harness = Harness::start(ScriptedTransport::new(), RetryPolicy::default());

    harness
        .broker
        .publish(SOURCE, codec::encode(&DeliveryRequest::default()).unwrap())
        .await
        .unwrap();

    harness
        .broker
        .wait_for_count(DEAD_LETTERS, 1, WAIT)
        .await
        .unwrap();
    let envelope = dead_letters(&harness.broker).await.remove(0);
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Permanent));
    assert_eq!(envelope.attempts(), 0);
    assert_eq!(harness.transport.calls(), 0);

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_outage_leaves_record_unacknowledged() {
    let broker = TestBroker::new();
    broker.fail_publishes_to(DEAD_LETTERS);
    let transport =
        ScriptedTransport::always_failing(TransportError::Rejected("mailbox closed".to_string()));
    let harness =
        Harness::start_with(broker, transport, RetryPolicy::fixed(1, Duration::from_secs(1)));
    let intake = harness.processor.submission_service().unwrap();

    intake
        .submit(&DeliveryRequest::new("user@example.com"))
        .await
        .unwrap();

    eventually(WAIT, async || harness.transport.calls() >= 2).await;
    assert_eq!(harness.broker.len(DEAD_LETTERS).await.unwrap(), 0);
    assert_eq!(harness.broker.lag(SOURCE, GROUP).await.unwrap(), 1);

    harness.broker.restore_publishes_to(DEAD_LETTERS);
    harness
        .broker
        .wait_for_count(DEAD_LETTERS, 1, WAIT)
        .await
        .unwrap();
    eventually(WAIT, async || harness.broker.lag(SOURCE, GROUP).await.unwrap() == 0).await;

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_releases_without_dead_lettering() {
    let transport =
        ScriptedTransport::always_failing(TransportError::Timeout("no answer".to_string()));
    let harness = Harness::start(transport, RetryPolicy::fixed(3, Duration::from_secs(600)));
    let intake = harness.processor.submission_service().unwrap();

    intake
        .submit(&DeliveryRequest::new("user@example.com"))
        .await
        .unwrap();
    eventually(WAIT, async || harness.transport.calls() == 1).await;

    let broker = harness.broker.clone();
    let transport = harness.transport.clone();
    harness.stop().await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(broker.len(DEAD_LETTERS).await.unwrap(), 0);
    assert_eq!(broker.lag(SOURCE, GROUP).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_workers_deliver_every_request_once() {
    let harness = Harness::start(ScriptedTransport::new(), RetryPolicy::default());
    let intake = harness.processor.submission_service().unwrap();
    let sent = harness.processor.sent_log().unwrap();

    for i in 0..20 {
        intake
            .submit(&DeliveryRequest::new(format!("user{i}@example.com")))
            .await
            .unwrap();
    }

    eventually(WAIT, async || sent.len() == 20).await;
    let mut delivered = sent.snapshot();
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 20);
    assert_eq!(harness.transport.calls(), 20);
    assert_eq!(harness.broker.len(DEAD_LETTERS).await.unwrap(), 0);

    harness.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manual_resend_puts_request_back_on_source_topic() {
    let transport = ScriptedTransport::new()
        .then_fail(TransportError::ConnectionFailed("refused".to_string()))
        .then_succeed();
    let harness = Harness::start(transport, RetryPolicy::fixed(1, Duration::from_secs(1)));
    let intake = harness.processor.submission_service().unwrap();
    let manual = harness.processor.manual_retry_service().unwrap();
    let sent = harness.processor.sent_log().unwrap();

    intake
        .submit(&DeliveryRequest::new("user@example.com"))
        .await
        .unwrap();
    eventually(WAIT, async || manual.registry().len() == 1).await;
    assert!(sent.is_empty());

    let id = manual.registry().list()[0].id();
    manual.resend(id).await.unwrap();

    eventually(WAIT, async || sent.len() == 1).await;
    assert_eq!(sent.snapshot(), vec!["user@example.com".to_string()]);
    assert!(manual.registry().is_empty());

    harness.stop().await.unwrap();
}
