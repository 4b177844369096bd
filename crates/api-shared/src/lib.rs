//! # API Shared
//!
//! Shared utilities for the consultation API.
//!
//! Contains:
//! - Bearer-credential parsing and JWT verification against a published JWK set (`auth`)
//! - The health check payload and service (`health`)
//!
//! Kept free of any HTTP framework so the verifier can be reused outside `api-rest`.

pub mod auth;
pub mod health;

pub use auth::{bearer_token, AuthError, Claims, JwksVerifier, TokenVerifier};
pub use health::{HealthRes, HealthService};
