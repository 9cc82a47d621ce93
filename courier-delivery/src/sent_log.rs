use std::sync::Arc;

use parking_lot::RwLock;

/// Append-only record of delivered addresses
///
/// Appends from concurrent workers never lose entries and readers get a
/// point-in-time copy. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    entries: Arc<RwLock<Vec<String>>>,
}

impl SentLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, address: impl Into<String>) {
        self.entries.write().push(address.into());
    }

    /// Every address recorded so far, in append order
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
