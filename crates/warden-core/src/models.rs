//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod certificate;
pub mod certificate_group;
pub mod jwk;
pub mod private_key;
pub mod service_account;
