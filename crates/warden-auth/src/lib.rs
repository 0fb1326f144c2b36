//! Warden Auth: Service-account token verification with replay
//! protection, and the JWT-bearer token exchange.

pub mod config;
pub mod error;
pub mod exchange;
pub mod replay;
pub mod token;
pub mod validator;

pub use config::{ReplayBackendKind, ReplayCacheConfig, TokenExchangeConfig, TokenValidatorConfig};
pub use error::AuthError;
pub use exchange::{JWT_BEARER_GRANT, TokenExchangeRequest, TokenExchangeResponse, TokenExchangeService};
pub use replay::{MemoryReplayCache, RedisReplayCache, ReplayBackend, ReplayCache, ReplayCheck};
pub use token::AccessTokenClaims;
pub use validator::{ServiceAccountClaims, ServiceAccountTokenValidator, VerifiedToken, peek_claims};
