//! Audit logging for delivery lifecycle events
//!
//! ## Audit Events
//!
//! - `DeliveryAttempt`: One attempt against the downstream transport
//! - `DeliverySuccess`: Request delivered, no further attempts
//! - `DeadLettered`: Request handed to the dead-letter channel
//! - `TriageAction`: Action chosen for a dead-lettered request
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging for delivery lifecycle events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redact the local part of recipient addresses
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: std::sync::OnceLock<Arc<AuditConfig>> = std::sync::OnceLock::new();

/// Initialize audit logging with configuration
///
/// Only the first call takes effect.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

fn recipient(recipient: &str) -> Option<String> {
    let config = config();
    config
        .enabled
        .then(|| redact_email(recipient, config.redact_recipients))
}

/// Log a delivery attempt (1-based attempt number)
pub fn log_delivery_attempt(request_ref: &str, recipient_address: &str, attempt: u32) {
    let Some(recipient) = recipient(recipient_address) else {
        return;
    };

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryAttempt",
        request = %request_ref,
        recipient = %recipient,
        delivery_attempt = attempt,
        "Audit: Delivery attempt"
    );
}

/// Log a successful delivery
pub fn log_delivery_success(request_ref: &str, recipient_address: &str, attempts: u32) {
    let Some(recipient) = recipient(recipient_address) else {
        return;
    };

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliverySuccess",
        request = %request_ref,
        recipient = %recipient,
        delivery_attempt = attempts,
        "Audit: Delivery successful"
    );
}

/// Log a request being moved to the dead-letter channel
pub fn log_dead_lettered(
    request_ref: &str,
    recipient_address: &str,
    failure_kind: &str,
    error: &str,
    attempts: u32,
) {
    let Some(recipient) = recipient(recipient_address) else {
        return;
    };

    tracing::event!(
        tracing::Level::WARN,
        event = "DeadLettered",
        request = %request_ref,
        recipient = %recipient,
        failure_kind = %failure_kind,
        error = %error,
        delivery_attempt = attempts,
        "Audit: Delivery dead-lettered"
    );
}

/// Log the action triage took for a dead-lettered request
pub fn log_triage_action(envelope_id: &str, original: &str, failure_kind: &str, action: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "TriageAction",
        envelope_id = %envelope_id,
        original = %original,
        failure_kind = %failure_kind,
        action = %action,
        "Audit: Dead-letter triaged"
    );
}
