use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Where a record lives: the provenance carried into dead-letter envelopes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

impl Location {
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: u32, offset: u64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

/// A record handed out to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub location: Location,
    pub payload: Arc<[u8]>,
    /// How many times this record has been handed out, starting at 1
    pub delivery_count: u32,
}

impl Record {
    /// Returns `true` if this record was handed out before and released
    #[must_use]
    pub const fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}
