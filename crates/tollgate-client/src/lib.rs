//! # Tollgate Client SDK
//!
//! A client for the Tollgate v2 API.
//!
//! ## Features
//!
//! - **Token caching**: one token per client, issued from the client secret
//! - **Expiry recovery**: a 419 triggers a single re-issue and retry
//! - **Envelope errors**: gateway rejections map to [`ClientError::Api`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use tollgate_client::{Config, TollgateClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = TollgateClient::new(Config::new("http://localhost:8002", "my-secret"))?;
//!
//!     let claims = client.test_token().await?;
//!     println!("Tenant: {}", claims.tenant_id);
//!
//!     let posts = client.posts_by_hashtag("rust").await?;
//!     println!("{posts}");
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod types;

pub use client::TollgateClient;
pub use config::Config;
pub use error::{ClientError, Result};
pub use types::*;
