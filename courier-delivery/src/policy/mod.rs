//! Policy abstractions for delivery operations.
//!
//! - [`RetryPolicy`]: how many attempts, which failures may be retried, and
//!   how long to wait in between
//! - [`Backoff`]: the shape of the wait between attempts

pub mod backoff;
pub mod retry;

pub use backoff::Backoff;
pub use retry::RetryPolicy;
