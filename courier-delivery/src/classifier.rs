//! Failure classification
//!
//! [`classify`] is the only place a [`DeliveryError`] is turned into a
//! [`FailureKind`]. The retry executor uses it to decide whether to try again
//! and the dead-letter router records its answer in the envelope.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{DeliveryError, TransportError};

/// Coarse category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Malformed input: retrying can never help
    Permanent,
    /// Connection level or downstream availability: retrying may help
    Transient,
    /// Not recognised by the classifier; retried, then flagged as a gap
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "Permanent",
            Self::Transient => "Transient",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognised failure kind: {0}")]
pub struct UnrecognisedFailureKind(pub String);

impl FromStr for FailureKind {
    type Err = UnrecognisedFailureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Permanent" => Ok(Self::Permanent),
            "Transient" => Ok(Self::Transient),
            "Unknown" => Ok(Self::Unknown),
            other => Err(UnrecognisedFailureKind(other.to_string())),
        }
    }
}

/// Result of one attempt against the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub failure_kind: Option<FailureKind>,
    pub message: Option<String>,
}

impl AttemptOutcome {
    #[must_use]
    pub const fn success() -> Self {
        Self {
            succeeded: true,
            failure_kind: None,
            message: None,
        }
    }

    #[must_use]
    pub fn failure(error: &DeliveryError) -> Self {
        Self {
            succeeded: false,
            failure_kind: Some(classify(error)),
            message: Some(error.to_string()),
        }
    }
}

/// Map a failure onto its [`FailureKind`]
///
/// Depends on nothing but the error variant, so the same error always yields
/// the same kind.
#[must_use]
pub const fn classify(error: &DeliveryError) -> FailureKind {
    match error {
        DeliveryError::Invalid(_)
        | DeliveryError::Malformed(_)
        | DeliveryError::Transport(TransportError::Rejected(_)) => FailureKind::Permanent,
        DeliveryError::Transport(
            TransportError::ConnectionFailed(_)
            | TransportError::ServerUnavailable(_)
            | TransportError::Timeout(_),
        ) => FailureKind::Transient,
        DeliveryError::Transport(TransportError::Other(_)) | DeliveryError::Unexpected(_) => {
            FailureKind::Unknown
        }
    }
}
