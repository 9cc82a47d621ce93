//! Types shared by every courier crate: the work item that flows through the
//! pipeline, the shutdown signal, logging setup and audit events.

pub mod audit;
pub mod logging;
pub mod request;

pub use request::DeliveryRequest;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
