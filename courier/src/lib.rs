pub mod config;
pub mod controller;
pub mod intake;

pub use controller::Courier;
