//! # Tollgate Gateway
//!
//! Multi-tenant HTTP front door for a versioned API.
//!
//! This crate provides:
//! - **Versioned routing**: the retired `/v1` answers 410 everywhere
//! - **CORS**: credentialed CORS for origins registered to a tenant
//! - **Rate Limiting**: fixed windows per IP or per tenant tier
//! - **Authentication**: bearer tokens issued against client secrets
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Tenant sites / API clients             │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  tollgate-gateway                   │
//! ├─────────────────────────────────────────────────────┤
//! │  /v1 ──► 410 Gone                                   │
//! │  /v2 ──► CORS gate ► rate limit ► token ► handler   │
//! ├─────────────────────────────────────────────────────┤
//! │                   tollgate-core                     │
//! │   (tokens, rate windows, tenant registry, CORS)     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use backend::{ApiBackend, EmptyBackend};
pub use config::GatewayConfig;
pub use error::{ApiError, GatewayErrorCode};
pub use server::{run_server, run_server_with_shutdown, serve};
pub use state::AppState;
