//! Channel abstraction for the delivery pipeline
//!
//! Work items and dead-letter envelopes travel over named topics. Every record
//! has a [`Location`] (topic, partition, offset) that is carried into
//! dead-letter envelopes as provenance. Consumers read through a
//! [`Subscription`], which tracks a consumer group's position and offers
//! at-least-once semantics: a record is handed out, then either acknowledged or
//! released back for redelivery.

pub mod backends;
pub mod codec;
pub mod config;
pub mod error;
pub mod subscription;
pub mod r#trait;
pub mod types;

pub use backends::{MemoryBroker, TestBroker};
pub use config::BrokerConfig;
pub use error::{QueueError, Result, SerializationError};
pub use subscription::Subscription;
pub use r#trait::Broker;
pub use types::{Location, Record};
