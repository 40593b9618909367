//! # Tollgate
//!
//! Umbrella crate over the Tollgate workspace.
//!
//! - [`engine`]: tokens, rate windows, tenant registry, CORS decisions
//! - [`gateway`]: the axum gateway and its binary
//! - [`client`]: the HTTP client SDK

pub use tollgate_cli as gateway;
pub use tollgate_client as client;
pub use tollgate_core as engine;
