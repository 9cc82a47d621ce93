use std::sync::Arc;

use serde::Deserialize;

use crate::{backends::MemoryBroker, r#trait::Broker};

/// Configuration for the broker backing the pipeline's topics
///
/// # Examples
///
/// Unlimited in-memory broker:
/// ```ron
/// Courier (
///     broker: (),
/// )
/// ```
///
/// With a per-topic capacity limit:
/// ```ron
/// Courier (
///     broker: (
///         capacity: Some(10000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    /// Maximum number of records per topic (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl BrokerConfig {
    /// Convert the configuration into a shared broker
    #[must_use]
    pub fn into_broker(self) -> Arc<dyn Broker> {
        self.capacity.map_or_else(
            || Arc::new(MemoryBroker::new()) as Arc<dyn Broker>,
            |capacity| Arc::new(MemoryBroker::with_capacity(capacity)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_from_config() {
        let config: BrokerConfig = ron::from_str("(capacity: Some(1))").unwrap();
        let broker = config.into_broker();

        broker.publish("t", vec![1]).await.unwrap();
        assert!(broker.publish("t", vec![2]).await.is_err());
    }

    #[test]
    fn test_default_is_unlimited() {
        let config: BrokerConfig = ron::from_str("()").unwrap();
        assert_eq!(config.capacity, None);
    }
}
