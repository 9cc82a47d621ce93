//! Shared harness for processor-level tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier_common::Signal;
use courier_delivery::{
    AlertSink, DeadLetterEnvelope, DeliveryProcessor, ProcessorError, RetryPolicy,
    ScriptedTransport, Severity, TriageError,
};
use courier_queue::TestBroker;
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};

pub const SOURCE: &str = "email-send-requests";
pub const GROUP: &str = "email-service";
pub const DEAD_LETTERS: &str = "email-send-requests.DLT";

/// Alert sink that remembers every alert
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(Severity, DeadLetterEnvelope)>>,
    count: AtomicU32,
}

impl RecordingAlertSink {
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn alerts(&self) -> Vec<(Severity, DeadLetterEnvelope)> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn alert(
        &self,
        severity: Severity,
        envelope: &DeadLetterEnvelope,
    ) -> Result<(), TriageError> {
        self.alerts.lock().push((severity, envelope.clone()));
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A processor running in the background against a [`TestBroker`]
pub struct Harness {
    pub broker: TestBroker,
    pub transport: ScriptedTransport,
    pub alerts: Arc<RecordingAlertSink>,
    pub processor: Arc<DeliveryProcessor>,
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<Result<(), ProcessorError>>,
}

impl Harness {
    pub fn start(transport: ScriptedTransport, retry: RetryPolicy) -> Self {
        Self::start_with(TestBroker::new(), transport, retry)
    }

    pub fn start_with(broker: TestBroker, transport: ScriptedTransport, retry: RetryPolicy) -> Self {
        let alerts = Arc::new(RecordingAlertSink::default());
        let mut processor: DeliveryProcessor =
            ron::from_str("(workers: 2, poll_interval_millis: 10, error_pause_millis: 100)")
                .unwrap();
        processor.retry = retry;
        processor.init_with(
            Arc::new(broker.clone()),
            Arc::new(transport.clone()),
            alerts.clone(),
        );

        let processor = Arc::new(processor);
        let (shutdown, rx) = broadcast::channel(1);
        let handle = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.serve(rx).await }
        });

        Self {
            broker,
            transport,
            alerts,
            processor,
            shutdown,
            handle,
        }
    }

    pub async fn stop(self) -> Result<(), ProcessorError> {
        self.shutdown.send(Signal::Shutdown).unwrap();
        self.handle.await.unwrap()
    }
}

/// Poll `condition` until it holds, panicking after `timeout`
pub async fn eventually(timeout: Duration, mut condition: impl AsyncFnMut() -> bool) {
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
