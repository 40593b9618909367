//! Main client implementation

use crate::{
    types::{Claims, IssueTokenRequest, IssuedToken, Payload},
    ClientError, Config, Result,
};
use parking_lot::Mutex;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

/// Tollgate API client
///
/// Exchanges the configured client secret for a token on first use and
/// keeps it. A request answered with 419 gets one fresh token and one retry;
/// 401 and every other rejection surface as [`ClientError::Api`].
pub struct TollgateClient {
    config: Config,
    base: Url,
    http: Client,
    token: Mutex<Option<String>>,
}

impl TollgateClient {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let base = Url::parse(&config.endpoint)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Config(format!("invalid endpoint {}", config.endpoint)));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| ClientError::Config("invalid user agent".to_string()))?,
        );
        if let Some(origin) = &config.origin {
            headers.insert(
                header::ORIGIN,
                origin
                    .parse()
                    .map_err(|_| ClientError::Config(format!("invalid origin {}", origin)))?,
            );
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            config,
            base,
            http,
            token: Mutex::new(None),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Currently cached token, if any
    pub fn cached_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    // ==================== Token Operations ====================

    /// Exchange the client secret for a new token and cache it
    #[instrument(skip(self))]
    pub async fn issue_token(&self) -> Result<String> {
        let url = self.url(&["v2", "token"])?;
        let body = IssueTokenRequest {
            client_secret: &self.config.client_secret,
        };
        let response = check(self.http.post(url).json(&body).send().await?).await?;
        let issued: IssuedToken = response.json().await?;

        *self.token.lock() = Some(issued.token.clone());
        debug!("Issued new token");
        Ok(issued.token)
    }

    /// Echo the claims of the current token
    #[instrument(skip(self))]
    pub async fn test_token(&self) -> Result<Claims> {
        self.authorized_get(&["v2", "test"]).await
    }

    // ==================== Resource Operations ====================

    /// Posts of the token's user
    #[instrument(skip(self))]
    pub async fn my_posts(&self) -> Result<Value> {
        self.authorized_get(&["v2", "posts", "my"]).await
    }

    /// Posts carrying a hashtag
    #[instrument(skip(self))]
    pub async fn posts_by_hashtag(&self, tag: &str) -> Result<Value> {
        self.authorized_get(&["v2", "posts", "hashtag", tag]).await
    }

    /// Followers of the token's user
    #[instrument(skip(self))]
    pub async fn my_followers(&self) -> Result<Value> {
        self.authorized_get(&["v2", "followers", "my"]).await
    }

    // ==================== Helper Methods ====================

    async fn token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        self.issue_token().await
    }

    /// Drop the cached token unless a concurrent caller already replaced it
    fn invalidate(&self, stale: &str) {
        let mut cached = self.token.lock();
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    async fn authorized_get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        let token = self.token().await?;

        let response = match self.send(self.http.get(url.clone()), &token).await {
            Err(e) if e.is_expired_token() => {
                debug!("Token expired; re-issuing once");
                self.invalidate(&token);
                let fresh = self.issue_token().await?;
                self.send(self.http.get(url), &fresh).await?
            }
            other => other?,
        };

        let body: Payload<T> = response.json().await?;
        Ok(body.payload)
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> Result<Response> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;
        check(response).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("invalid endpoint {}", self.config.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let text = response.text().await.unwrap_or_default();
    Err(ClientError::from_envelope(&text, status.as_u16(), retry_after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = TollgateClient::new(Config::new("http://gw.test/api/", "s")).unwrap();
        let url = client.url(&["v2", "posts", "hashtag", "rust lang"]).unwrap();
        assert_eq!(url.as_str(), "http://gw.test/api/v2/posts/hashtag/rust%20lang");
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(matches!(
            TollgateClient::new(Config::new("not a url", "s")),
            Err(ClientError::Config(_))
        ));
    }
}
