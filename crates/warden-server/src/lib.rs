//! Warden Server: Configuration loading and service wiring shared by
//! the `warden` binary.

pub mod app;
pub mod config;
pub mod error;

pub use app::{RotationSummary, Warden};
pub use config::WardenConfig;
pub use error::ServerError;
