//! Dead-letter triage
//!
//! The terminal stage of the pipeline. Triage decides what to do with a
//! dead-lettered request and does it, but never resends and never fails back
//! into the dead-letter channel: errors while acting are raised as critical
//! alerts and swallowed.

use std::{collections::VecDeque, fmt, sync::Arc};

use ahash::RandomState;
use async_trait::async_trait;
use courier_common::{audit, dead_letter, tracing};
use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use serde::Deserialize;
use ulid::Ulid;

use crate::{
    DeadLetterEnvelope, FailureKind, error::TriageError, manual_retry::ManualRetryRegistry,
};

/// How urgently an operator needs to look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// A request that can never succeed
    High,
    /// A failure the classifier did not recognise
    ClassifierGap,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("High"),
            Self::ClassifierGap => f.write_str("ClassifierGap"),
        }
    }
}

/// What triage does with a dead letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriageAction {
    AlertOperator { severity: Severity },
    FlagForManualRetry,
    LogOnly,
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlertOperator { severity } => write!(f, "AlertOperator({severity})"),
            Self::FlagForManualRetry => f.write_str("FlagForManualRetry"),
            Self::LogOnly => f.write_str("LogOnly"),
        }
    }
}

/// Where operator alerts go
#[async_trait]
pub trait AlertSink: Send + Sync + std::fmt::Debug {
    async fn alert(
        &self,
        severity: Severity,
        envelope: &DeadLetterEnvelope,
    ) -> Result<(), TriageError>;
}

/// Alerts as ERROR level log events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(
        &self,
        severity: Severity,
        envelope: &DeadLetterEnvelope,
    ) -> Result<(), TriageError> {
        tracing::error!(
            alert = %severity,
            envelope_id = %envelope.id(),
            original = %envelope.original_location(),
            recipient = %envelope.original_request().recipient(),
            failure_kind = %envelope.failure_kind_name(),
            error = %envelope.failure_message(),
            "Operator attention required for dead-lettered request"
        );
        Ok(())
    }
}

/// Triage behaviour
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriageConfig {
    /// Kinds that are only logged instead of alerted or flagged
    #[serde(default)]
    pub log_only_kinds: Vec<FailureKind>,

    /// Envelope ids remembered for duplicate suppression, oldest forgotten first
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            log_only_kinds: Vec::new(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

const fn default_dedup_capacity() -> usize {
    10_000
}

/// Decides and performs the action for each dead letter
///
/// Idempotent per envelope id: a redelivered envelope gets the action already
/// decided for it and no side effect is repeated. Only the most recent
/// `dedup_capacity` ids are remembered.
#[derive(Debug)]
pub struct TriageConsumer {
    config: TriageConfig,
    alerts: Arc<dyn AlertSink>,
    manual_retries: ManualRetryRegistry,
    handled: DashMap<Ulid, TriageAction, RandomState>,
    order: Mutex<VecDeque<Ulid>>,
}

impl TriageConsumer {
    #[must_use]
    pub fn new(
        config: TriageConfig,
        alerts: Arc<dyn AlertSink>,
        manual_retries: ManualRetryRegistry,
    ) -> Self {
        Self {
            config,
            alerts,
            manual_retries,
            handled: DashMap::default(),
            order: Mutex::default(),
        }
    }

    /// The action for `envelope`, without performing it
    #[must_use]
    pub fn decide(&self, envelope: &DeadLetterEnvelope) -> TriageAction {
        let kind = envelope.failure_kind();

        if kind.is_some_and(|kind| self.config.log_only_kinds.contains(&kind)) {
            return TriageAction::LogOnly;
        }

        match kind {
            Some(FailureKind::Permanent) => TriageAction::AlertOperator {
                severity: Severity::High,
            },
            Some(FailureKind::Transient) => TriageAction::FlagForManualRetry,
            Some(FailureKind::Unknown) | None => TriageAction::AlertOperator {
                severity: Severity::ClassifierGap,
            },
        }
    }

    /// Triage one envelope
    ///
    /// Always returns the chosen action. Failures performing it are reported as
    /// CRITICAL alerts and not returned.
    pub async fn triage(&self, envelope: &DeadLetterEnvelope) -> TriageAction {
        let action = match self.handled.entry(envelope.id()) {
            Entry::Occupied(entry) => {
                let action = *entry.get();
                drop(entry);
                dead_letter!(
                    level = DEBUG,
                    envelope_id = %envelope.id(),
                    action = %action,
                    "Envelope already triaged"
                );
                return action;
            }
            Entry::Vacant(entry) => *entry.insert(self.decide(envelope)),
        };
        self.remember(envelope.id());

        if let Err(error) = self.perform(action, envelope).await {
            tracing::error!(
                alert = "CRITICAL",
                envelope_id = %envelope.id(),
                original = %envelope.original_location(),
                action = %action,
                error = %error,
                "Dead-letter triage failed"
            );
        }

        audit::log_triage_action(
            &envelope.id().to_string(),
            &envelope.original_location().to_string(),
            envelope.failure_kind_name(),
            &action.to_string(),
        );

        action
    }

    /// Number of envelope ids currently remembered
    #[must_use]
    pub fn remembered(&self) -> usize {
        self.handled.len()
    }

    fn remember(&self, id: Ulid) {
        let evicted: Vec<Ulid> = {
            let mut order = self.order.lock();
            order.push_back(id);
            let excess = order.len().saturating_sub(self.config.dedup_capacity);
            order.drain(..excess).collect()
        };

        for id in evicted {
            self.handled.remove(&id);
        }
    }

    async fn perform(
        &self,
        action: TriageAction,
        envelope: &DeadLetterEnvelope,
    ) -> Result<(), TriageError> {
        match action {
            TriageAction::AlertOperator { severity } => {
                self.alerts.alert(severity, envelope).await
            }
            TriageAction::FlagForManualRetry => {
                self.manual_retries.flag(envelope)?;
                dead_letter!(
                    level = WARN,
                    envelope_id = %envelope.id(),
                    original = %envelope.original_location(),
                    attempts = envelope.attempts(),
                    "Transient failure flagged for manual retry"
                );
                Ok(())
            }
            TriageAction::LogOnly => {
                dead_letter!(
                    level = WARN,
                    envelope_id = %envelope.id(),
                    original = %envelope.original_location(),
                    failure_kind = %envelope.failure_kind_name(),
                    error = %envelope.failure_message(),
                    "Dead-lettered request logged"
                );
                Ok(())
            }
        }
    }
}
