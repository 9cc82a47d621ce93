//! Broker implementations
//!
//! - `memory`: In-memory topic log, used in-process and for development
//! - `test`: Test utilities with synchronization primitives and fault injection

pub mod memory;
pub mod test;

pub use memory::MemoryBroker;
pub use test::TestBroker;
