//! Downstream send abstraction
//!
//! There is no real wire transport here. [`TransportStub`] stands in for an
//! unreliable downstream service that fails most sends, and
//! [`ScriptedTransport`] replays a fixed sequence of outcomes for tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::{DeliveryRequest, delivery};
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;

use crate::error::{DeliveryError, TransportError};

/// Sends one request downstream.
///
/// Shared by every worker, so implementations must tolerate concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError>;
}

const fn default_failure_rate() -> f64 {
    0.9
}

/// Configuration for the simulated transport
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransportConfig {
    /// Probability (0.0 to 1.0) that a send fails with a transient error
    ///
    /// Default: 0.9
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            failure_rate: default_failure_rate(),
        }
    }
}

/// Simulated downstream service
///
/// Each send independently fails with [`TransportError::ServerUnavailable`]
/// with the configured probability.
#[derive(Debug, Clone, Copy)]
pub struct TransportStub {
    failure_rate: f64,
}

impl TransportStub {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let failure_rate = if config.failure_rate.is_nan() {
            0.0
        } else {
            config.failure_rate.clamp(0.0, 1.0)
        };
        Self { failure_rate }
    }

    #[must_use]
    pub const fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for TransportStub {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl Transport for TransportStub {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let fails = rand::rng().random_bool(self.failure_rate);

        if fails {
            delivery!(
                level = DEBUG,
                recipient = %request.recipient(),
                "Simulated downstream failure"
            );
            return Err(TransportError::ServerUnavailable(
                "downstream service temporarily unavailable".to_string(),
            )
            .into());
        }

        delivery!(
            level = DEBUG,
            recipient = %request.recipient(),
            body_len = request.body.as_deref().map_or(0, str::len),
            "Simulated downstream send"
        );
        Ok(())
    }
}

/// Transport that replays queued outcomes in order
///
/// Once the script runs out, every further send returns the fallback outcome
/// (success unless changed with [`ScriptedTransport::otherwise`]).
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<(), DeliveryError>>>>,
    fallback: Arc<Mutex<Option<DeliveryError>>>,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<DeliveryRequest>>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport on which every send fails with `error`
    #[must_use]
    pub fn always_failing(error: impl Into<DeliveryError>) -> Self {
        Self::new().otherwise(error)
    }

    /// Queue a successful send
    #[must_use]
    pub fn then_succeed(self) -> Self {
        self.script.lock().push_back(Ok(()));
        self
    }

    /// Queue a failed send
    #[must_use]
    pub fn then_fail(self, error: impl Into<DeliveryError>) -> Self {
        self.script.lock().push_back(Err(error.into()));
        self
    }

    /// Fail with `error` once the script is exhausted
    #[must_use]
    pub fn otherwise(self, error: impl Into<DeliveryError>) -> Self {
        *self.fallback.lock() = Some(error.into());
        self
    }

    /// Number of sends attempted so far
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request sent so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().clone().map_or(Ok(()), Err))
    }
}
