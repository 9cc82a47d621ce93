use std::sync::LazyLock;

use courier_common::{Signal, audit, audit::AuditConfig, internal, logging, tracing};
use courier_delivery::DeliveryProcessor;
use courier_queue::BrokerConfig;
use serde::Deserialize;
use tokio::{io::BufReader, sync::broadcast};

use crate::intake;

/// Top level controller, deserialized from the configuration file
///
/// # Example
///
/// ```ron
/// Courier (
///     broker: (capacity: Some(10000)),
///     delivery: (
///         workers: 4,
///         retry: (max_attempts: 3, interval_millis: 1000),
///     ),
///     audit: (redact_recipients: true),
///     stdin_intake: true,
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    broker: BrokerConfig,
    #[serde(alias = "processor", default)]
    delivery: DeliveryProcessor,
    #[serde(default)]
    audit: AuditConfig,
    /// Read requests from standard input, see [`crate::intake`]
    #[serde(default)]
    stdin_intake: bool,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Courier {
    /// Build the broker and every delivery component
    pub fn init(&mut self) {
        audit::init(self.audit.clone());

        let broker = self.broker.clone().into_broker();
        self.delivery.init(broker);
    }

    #[must_use]
    pub const fn delivery(&self) -> &DeliveryProcessor {
        &self.delivery
    }

    #[must_use]
    pub const fn audit(&self) -> &AuditConfig {
        &self.audit
    }

    /// Serve until `shutdown` delivers a signal
    ///
    /// # Errors
    ///
    /// If [`Courier::init`] was not called first, or a delivery worker panicked
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        self.delivery.serve(shutdown).await?;
        Ok(())
    }

    /// Run this controller, and everything it controls, until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// This function will return an error if the signal handlers cannot be
    /// installed or the delivery processor fails.
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();
        self.init();

        internal!("Controller running");

        if self.stdin_intake {
            let service = self.delivery.submission_service()?;
            tokio::spawn(async move {
                if let Err(error) =
                    intake::read_requests(BufReader::new(tokio::io::stdin()), &service).await
                {
                    tracing::error!("Request intake stopped: {error:#}");
                }
            });
        }

        let ret = tokio::select! {
            r = self.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}
