//! # Tollgate Core
//!
//! Admission engine for the Tollgate multi-tenant API gateway.
//!
//! This crate provides:
//! - **Tenants**: the registry interface the gateway consumes, plus an in-memory registry
//! - **Tokens**: signed, time-bounded bearer tokens carrying tenant and user identity
//! - **Rate Windows**: a shared fixed-window counter registry with tiered limits
//! - **CORS Gate**: origin resolution against registered tenant hosts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Gateway Pipeline              │
//! ├─────────────┬─────────────┬─────────────┤
//! │  CORS Gate  │ Rate Limits │   Tokens    │
//! ├─────────────┴──────┬──────┴─────────────┤
//! │   TenantRegistry   │       Clock        │
//! └────────────────────┴────────────────────┘
//! ```

pub mod clock;
pub mod cors;
pub mod error;
pub mod ratelimit;
pub mod tenant;
pub mod token;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use cors::{normalize_host, origin_host, CorsDecision, CorsGate};
pub use error::{RegistryError, Result, TokenError};
pub use ratelimit::{Admission, LimitPolicy, RateKey, RateLimits, RateLimiterRegistry, RateWindow};
pub use tenant::{with_timeout, MemoryTenantRegistry, Tenant, TenantRegistry, Tier};
pub use token::{extract_token, TokenClaims, TokenService};
