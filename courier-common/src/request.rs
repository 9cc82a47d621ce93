use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A single "send email" work item.
///
/// Both fields are optional on the wire: a missing address is a permanent
/// validation failure, not a decode failure, so it can still be dead-lettered
/// with provenance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    #[serde(default, alias = "email")]
    pub recipient_address: Option<String>,
    #[serde(default, alias = "emailBody")]
    pub body: Option<String>,
}

impl DeliveryRequest {
    #[must_use]
    pub fn new(recipient_address: impl Into<String>) -> Self {
        Self {
            recipient_address: Some(recipient_address.into()),
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The address, or an empty string when absent
    #[must_use]
    pub fn recipient(&self) -> &str {
        self.recipient_address.as_deref().unwrap_or_default()
    }
}

impl Display for DeliveryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeliveryRequest{{recipient={:?}, body={:?}}}",
            self.recipient_address, self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_builder() {
        let request = DeliveryRequest::new("a@b.com").with_body("hello");
        assert_eq!(request.recipient(), "a@b.com");
        assert_eq!(request.body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_missing_address() {
        let request = DeliveryRequest::default();
        assert_eq!(request.recipient(), "");
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let request: DeliveryRequest =
            ron::from_str(r#"(email: Some("user@example.com"), emailBody: Some("hi"))"#).unwrap();
        assert_eq!(request, DeliveryRequest::new("user@example.com").with_body("hi"));

        let request: DeliveryRequest = ron::from_str("()").unwrap();
        assert_eq!(request.recipient_address, None);
    }
}
