//! Warden PKI: Certificate authority, certificate groups, issuance,
//! rotation, JWKS publication and server-side payload signing.
//!
//! Leaf modules ([`keys`], [`subject`], [`extensions`], [`csr`], [`jwk`])
//! wrap the X.509 and key primitives; the service modules compose them
//! over the `warden-core` repository traits.

pub mod audit;
pub mod ca;
pub mod config;
pub mod csr;
pub mod error;
pub mod extensions;
pub mod issuance;
pub mod jwk;
pub mod jwks;
pub mod keys;
pub mod registry;
pub mod rotation;
pub mod seal;
pub mod signing;
pub mod subject;

pub use audit::{Actor, AuditRecorder};
pub use ca::CaKeyStore;
pub use config::{PkiConfig, SigningConfig};
pub use error::PkiError;
pub use issuance::{IssuanceService, IssueForGroupRequest, IssuedWithKey, SignCsrRequest};
pub use jwks::{JwksMode, JwksPublisher};
pub use registry::CertificateGroupService;
pub use rotation::{RotationEngine, RotationResult, RotationStatus};
pub use signing::{PayloadSignature, SignPayloadRequest, SigningService};
