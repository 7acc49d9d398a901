//! Throttled HTTP client for the inventory REST API.
//!
//! Every request waits for a slot in the matching limiter, keyed by the full
//! request URL. A server-side 429 is treated as authoritative: the local
//! record for that URL is dropped and the caller gets
//! [`ClientError::RateLimitExceeded`].

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::ratelimit::{LimiterKind, RateLimiters};

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Inventory list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Firewalls,
    Vdoms,
    Interfaces,
    Routes,
    Vips,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Firewalls,
        Resource::Vdoms,
        Resource::Interfaces,
        Resource::Routes,
        Resource::Vips,
    ];

    /// Path below the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Firewalls => "firewalls/",
            Resource::Vdoms => "vdoms/",
            Resource::Interfaces => "interfaces/",
            Resource::Routes => "routes/",
            Resource::Vips => "vips/",
        }
    }

    /// Query parameters the dashboard always sends for this resource.
    pub fn default_query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Resource::Routes => &[("include_vdom", "true")],
            _ => &[],
        }
    }

    /// Merge caller parameters with the defaults; defaults win on a clash.
    pub fn query(&self, params: &[(String, String)]) -> Vec<(String, String)> {
        let defaults = self.default_query();
        let mut query: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| !defaults.iter().any(|(d, _)| d == k))
            .cloned()
            .collect();
        query.extend(defaults.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        query
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_end_matches('/'))
    }
}

/// Per-section paging for the IP search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchPagination {
    pub interfaces_skip: Option<u64>,
    pub interfaces_limit: Option<u64>,
    pub routes_skip: Option<u64>,
    pub routes_limit: Option<u64>,
    pub vips_skip: Option<u64>,
    pub vips_limit: Option<u64>,
}

impl SearchPagination {
    fn query_pairs(&self) -> Vec<(String, String)> {
        [
            ("interfaces.skip", self.interfaces_skip),
            ("interfaces.limit", self.interfaces_limit),
            ("routes.skip", self.routes_skip),
            ("routes.limit", self.routes_limit),
            ("vips.skip", self.vips_skip),
            ("vips.limit", self.vips_limit),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string())))
        .collect()
    }
}

/// Result of an IP search across interfaces, routes and VIPs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpSearchResult {
    pub interfaces: Page<serde_json::Value>,
    pub routes: Page<serde_json::Value>,
    pub vips: Page<serde_json::Value>,
}

/// HTTP client that routes every request through a rate limiter.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: Url,
    limiters: Arc<RateLimiters>,
}

impl InventoryClient {
    /// Create a client for `config.base_url` sharing the given limiters.
    pub fn new(config: &ApiConfig, limiters: Arc<RateLimiters>) -> Result<Self, ClientError> {
        // A trailing slash makes relative joins land below the base path
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url,
            limiters,
        })
    }

    /// The limiters this client throttles through.
    pub fn limiters(&self) -> &Arc<RateLimiters> {
        &self.limiters
    }

    /// Build the full request URL; this is also the limiter key.
    pub fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET `path` and decode the JSON body, throttled by the `kind` limiter.
    #[instrument(skip(self, query, kind), fields(kind = %kind))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
        kind: LimiterKind,
    ) -> Result<T, ClientError> {
        let url = self.url(path, query)?;
        let response = self.send(url, kind).await?;
        Ok(response.json::<T>().await?)
    }

    /// List one inventory resource.
    pub async fn list(
        &self,
        resource: Resource,
        params: &[(String, String)],
    ) -> Result<Page<serde_json::Value>, ClientError> {
        self.get_json(resource.path(), &resource.query(params), LimiterKind::Api).await
    }

    /// Search interfaces, routes and VIPs for an IP address or fragment.
    pub async fn search_ip(
        &self,
        query: &str,
        pagination: &SearchPagination,
    ) -> Result<IpSearchResult, ClientError> {
        let mut params = vec![("query".to_string(), query.to_string())];
        params.extend(pagination.query_pairs());
        self.get_json("search/ip", &params, LimiterKind::Search).await
    }

    /// Whether `GET {base}/health` answers 200.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.url("health", &[])?;
        match self.send(url, LimiterKind::Api).await {
            Ok(response) => Ok(response.status() == StatusCode::OK),
            Err(ClientError::Status { status, .. }) => {
                debug!(status = %status, "Health check returned non-success status");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, url: Url, kind: LimiterKind) -> Result<reqwest::Response, ClientError> {
        let key = url.as_str().to_string();
        let limiter = self.limiters.get(kind);

        limiter.wait_for_slot(&key).await;
        debug!(url = %key, "Sending request");

        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            limiter.reset(Some(&key));
            warn!(url = %key, kind = %kind, "Server rate limit exceeded");
            return Err(ClientError::RateLimitExceeded { url: key });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %key, status = %status, "Request failed");
            return Err(ClientError::Status { status, body });
        }

        Ok(response)
    }
}
