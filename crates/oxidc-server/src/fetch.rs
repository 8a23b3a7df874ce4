//! Outbound document fetcher
//!
//! The engine reaches out for exactly two kinds of documents: client JWK
//! sets (`jwks_uri`) and pairwise sector identifier lists
//! (`sector_identifier_uri`). Both are fetched with a hard timeout and
//! memoized for a short TTL so bursts of assertions do not hammer the
//! client's infrastructure.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};

use oxidc_core::error::{OAuthError, OAuthResult};
use oxidc_core::Client;

/// Timeout-bounded, TTL-memoized JSON fetcher.
pub struct Fetcher {
    http: reqwest::Client,
    cache: Cache<String, Value>,
    timeout: Duration,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Build a fetcher with the configured timeout and memoization TTL.
    #[must_use]
    pub fn new(timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache: Cache::builder()
                .max_capacity(1024)
                .time_to_live(cache_ttl)
                .build(),
            timeout,
        }
    }

    /// Fetch a JSON document, memoized by URL.
    pub async fn json(&self, url: &str) -> OAuthResult<Value> {
        let http = self.http.clone();
        let timeout = self.timeout;
        let target = url.to_string();
        self.cache
            .try_get_with(url.to_string(), async move {
                debug!(url = %target, "fetching remote document");
                let response = http
                    .get(&target)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|e| format!("fetch {target}: {e}"))?;
                if !response.status().is_success() {
                    return Err(format!("fetch {target}: status {}", response.status()));
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| format!("fetch {target}: {e}"))
            })
            .await
            .map_err(|e: Arc<String>| {
                warn!(url = %url, error = %e, "remote document fetch failed");
                OAuthError::server_error(e.as_str().to_string())
            })
    }

    /// The client's JWK set: inline `jwks` wins, `jwks_uri` is fetched.
    pub async fn client_jwks(&self, client: &Client) -> OAuthResult<JwkSet> {
        let document = if let Some(inline) = &client.jwks {
            inline.clone()
        } else if let Some(uri) = &client.jwks_uri {
            self.json(uri).await?
        } else {
            return Err(OAuthError::invalid_client(
                "The client has no registered JWK set.",
            ));
        };
        serde_json::from_value(document).map_err(|e| {
            OAuthError::invalid_client(format!("The client JWK set is malformed: {e}"))
        })
    }

    /// The sector identifier document: a JSON array of redirect URIs.
    pub async fn sector_redirect_uris(&self, uri: &str) -> OAuthResult<Vec<String>> {
        let document = self.json(uri).await?;
        document
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .ok_or_else(|| {
                OAuthError::invalid_client(
                    "The sector identifier document is not a JSON array of redirect URIs.",
                )
            })
    }
}
