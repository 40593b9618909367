//! Business handlers behind the gateway

use async_trait::async_trait;
use serde_json::{json, Value};

/// Application logic invoked only after a request passes every gateway stage
#[async_trait]
pub trait ApiBackend: Send + Sync {
    /// Posts written by a user
    async fn my_posts(&self, user_id: &str) -> anyhow::Result<Value>;

    /// Posts tagged with a hashtag
    async fn posts_by_hashtag(&self, tag: &str) -> anyhow::Result<Value>;

    /// Followers of a user
    async fn my_followers(&self, user_id: &str) -> anyhow::Result<Value>;
}

/// Backend with no data
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyBackend;

#[async_trait]
impl ApiBackend for EmptyBackend {
    async fn my_posts(&self, _user_id: &str) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn posts_by_hashtag(&self, _tag: &str) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn my_followers(&self, _user_id: &str) -> anyhow::Result<Value> {
        Ok(json!([]))
    }
}
