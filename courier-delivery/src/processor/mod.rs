//! Delivery processor orchestration

pub mod triage;
pub mod worker;

use std::{sync::Arc, time::Duration};

use courier_common::{Signal, internal, tracing};
use courier_queue::{Broker, Subscription};
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    AlertSink, DeadLetterConfig, DeadLetterRouter, DeliveryPipeline, LogAlertSink,
    ManualRetryRegistry, ManualRetryService, RetryExecutor, RetryPolicy, SentLog,
    SubmissionService, Transport, TransportConfig, TransportStub, TriageConfig, TriageConsumer,
    error::ProcessorError,
    processor::triage::TriageProcessor,
    rate_limiter::RateLimitConfig,
};

fn default_source_topic() -> String {
    "email-send-requests".to_string()
}

fn default_group_id() -> String {
    "email-service".to_string()
}

const fn default_workers() -> usize {
    4
}

const fn default_poll_interval_millis() -> u64 {
    50
}

const fn default_error_pause_millis() -> u64 {
    1000
}

/// Everything the workers share, built by [`DeliveryProcessor::init`]
#[derive(Debug)]
struct Components {
    broker: Arc<dyn Broker>,
    pipeline: Arc<DeliveryPipeline>,
    triage: Arc<TriageConsumer>,
    manual_retry: ManualRetryService,
    sent: SentLog,
}

/// Consumes work items from the source topic with a pool of workers and
/// triages whatever ends up on the dead-letter topic
///
/// # Example
///
/// ```ron
/// delivery: (
///     source_topic: "email-send-requests",
///     group_id: "email-service",
///     workers: 4,
///     retry: (max_attempts: 3, interval_millis: 1000),
///     dead_letter: (topic_suffix: ".DLT"),
///     triage: (log_only_kinds: [], dedup_capacity: 10000),
///     transport: (failure_rate: 0.9),
///     manual_retry: (messages_per_second: 1.0, burst_size: 10),
/// ),
/// ```
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// Topic work items are consumed from
    #[serde(default = "default_source_topic")]
    pub source_topic: String,

    /// Consumer group of the delivery workers
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Number of parallel delivery workers (at least one runs)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often an idle worker polls for work (in milliseconds)
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,

    /// Back off after a broker failure (in milliseconds)
    #[serde(default = "default_error_pause_millis")]
    pub error_pause_millis: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub dead_letter: DeadLetterConfig,

    #[serde(default)]
    pub triage: TriageConfig,

    /// Settings of the simulated downstream transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Rate limit for operator-initiated resends
    #[serde(default)]
    pub manual_retry: RateLimitConfig,

    /// Maximum number of envelopes waiting for manual retry (omit for unlimited)
    #[serde(default)]
    pub manual_retry_capacity: Option<usize>,

    #[serde(skip)]
    components: Option<Components>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            source_topic: default_source_topic(),
            group_id: default_group_id(),
            workers: default_workers(),
            poll_interval_millis: default_poll_interval_millis(),
            error_pause_millis: default_error_pause_millis(),
            retry: RetryPolicy::default(),
            dead_letter: DeadLetterConfig::default(),
            triage: TriageConfig::default(),
            transport: TransportConfig::default(),
            manual_retry: RateLimitConfig::default(),
            manual_retry_capacity: None,
            components: None,
        }
    }
}

impl DeliveryProcessor {
    /// Initialise with the simulated transport and log-based alerts
    pub fn init(&mut self, broker: Arc<dyn Broker>) {
        let transport = Arc::new(TransportStub::new(self.transport));
        self.init_with(broker, transport, Arc::new(LogAlertSink));
    }

    /// Initialise with explicit collaborators
    pub fn init_with(
        &mut self,
        broker: Arc<dyn Broker>,
        transport: Arc<dyn Transport>,
        alerts: Arc<dyn AlertSink>,
    ) {
        internal!("Initialising Delivery Processor ...");

        let sent = SentLog::new();
        let manual_retries = self
            .manual_retry_capacity
            .map_or_else(ManualRetryRegistry::new, ManualRetryRegistry::with_capacity);

        let pipeline = DeliveryPipeline::new(
            RetryExecutor::new(self.retry.clone(), transport),
            DeadLetterRouter::new(Arc::clone(&broker), self.dead_letter.clone()),
            sent.clone(),
        );
        let triage = TriageConsumer::new(self.triage.clone(), alerts, manual_retries.clone());
        let manual_retry =
            ManualRetryService::new(manual_retries, Arc::clone(&broker), self.manual_retry);

        internal!(
            source_topic = %self.source_topic,
            dead_letter_topic = %self.dead_letter_topic(),
            workers = self.workers,
            max_attempts = self.retry.max_attempts,
            interval_millis = self.retry.interval_millis,
            "Delivery processor initialised"
        );

        self.components = Some(Components {
            broker,
            pipeline: Arc::new(pipeline),
            triage: Arc::new(triage),
            manual_retry,
            sent,
        });
    }

    #[must_use]
    pub fn dead_letter_topic(&self) -> String {
        self.dead_letter.topic_for(&self.source_topic)
    }

    #[must_use]
    pub fn dead_letter_group(&self) -> String {
        self.dead_letter.group_for(&self.group_id)
    }

    fn components(&self) -> Result<&Components, ProcessorError> {
        self.components.as_ref().ok_or_else(|| {
            ProcessorError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            )
        })
    }

    /// Intake for new requests on the source topic
    ///
    /// # Errors
    /// If the processor has not been initialised
    pub fn submission_service(&self) -> Result<SubmissionService, ProcessorError> {
        let components = self.components()?;
        Ok(SubmissionService::new(
            Arc::clone(&components.broker),
            self.source_topic.clone(),
        ))
    }

    /// Operator resends of flagged dead letters
    ///
    /// Every handle shares one rate limit.
    ///
    /// # Errors
    /// If the processor has not been initialised
    pub fn manual_retry_service(&self) -> Result<ManualRetryService, ProcessorError> {
        Ok(self.components()?.manual_retry.clone())
    }

    /// Addresses delivered so far
    ///
    /// # Errors
    /// If the processor has not been initialised
    pub fn sent_log(&self) -> Result<SentLog, ProcessorError> {
        Ok(self.components()?.sent.clone())
    }

    /// Run the workers and the triage processor
    ///
    /// Runs until a shutdown signal is received. Shutdown cancels every worker,
    /// aborting any backoff in progress, and waits for them to finish. A record
    /// interrupted this way is released for redelivery, not dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor was not initialised or a worker panicked
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), ProcessorError> {
        let components = self.components()?;
        internal!("Delivery processor starting");

        let cancel = CancellationToken::new();
        let poll_interval = Duration::from_millis(self.poll_interval_millis);
        let pause = Duration::from_millis(self.error_pause_millis);
        let mut workers = JoinSet::new();

        let subscription = Subscription::new(
            Arc::clone(&components.broker),
            self.source_topic.clone(),
            self.group_id.clone(),
        )
        .with_poll_interval(poll_interval);

        for worker in 0..self.workers.max(1) {
            workers.spawn(worker::run(
                worker,
                subscription.clone(),
                Arc::clone(&components.pipeline),
                pause,
                cancel.clone(),
            ));
        }

        let triage = TriageProcessor::new(
            Subscription::new(
                Arc::clone(&components.broker),
                self.dead_letter_topic(),
                self.dead_letter_group(),
            )
            .with_poll_interval(poll_interval),
            Arc::clone(&components.triage),
        )
        .with_pause(pause);
        workers.spawn(triage.run(cancel.clone()));

        let mut result = Ok(());

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Delivery processor received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!("Delivery processor shutdown channel error: {e}");
                        }
                    }
                    break;
                }
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Delivery worker terminated unexpectedly: {e}");
                        result = Err(ProcessorError::WorkerPanic {
                            worker: "delivery".to_string(),
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        cancel.cancel();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Delivery worker failed during shutdown: {e}");
            }
        }

        internal!("Delivery processor shutdown complete");
        result
    }
}
