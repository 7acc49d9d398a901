//! Load generation against the inventory API through the throttled client.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{InventoryClient, Resource};
use crate::error::ClientError;
use crate::ratelimit::LimiterKind;

/// What to fire and how hard.
#[derive(Debug, Clone)]
pub struct LoadTestPlan {
    /// Total requests to send
    pub requests: usize,
    /// Maximum requests in flight
    pub concurrency: usize,
    /// Limiter the requests go through
    pub kind: LimiterKind,
    /// Endpoints to cycle through
    pub resources: Vec<Resource>,
}

impl Default for LoadTestPlan {
    fn default() -> Self {
        Self {
            requests: 1000,
            concurrency: 10,
            kind: LimiterKind::Api,
            resources: Resource::ALL.to_vec(),
        }
    }
}

/// Outcome counts and latencies of a finished run.
#[derive(Debug, Clone, Default)]
pub struct LoadTestSummary {
    pub succeeded: u64,
    /// Requests the server answered with 429
    pub rate_limited: u64,
    pub failed: u64,
    pub elapsed: Duration,
    latencies: Vec<Duration>,
}

impl LoadTestSummary {
    fn record(&mut self, outcome: &Result<(), ClientError>, latency: Duration) {
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(e) if e.is_rate_limited() => self.rate_limited += 1,
            Err(_) => self.failed += 1,
        }
        self.latencies.push(latency);
    }

    pub fn total(&self) -> u64 {
        self.succeeded + self.rate_limited + self.failed
    }

    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total() as f64 / secs
    }

    /// Latency at percentile `p` (0.0 to 100.0), nearest-rank.
    pub fn latency_percentile(&self, p: f64) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }
}

/// Run `plan` against `client` and collect the outcomes.
///
/// Latency includes time spent waiting for a local rate limit slot.
pub async fn run(client: &InventoryClient, plan: &LoadTestPlan) -> LoadTestSummary {
    let summary = Arc::new(Mutex::new(LoadTestSummary::default()));
    let resources = if plan.resources.is_empty() {
        Resource::ALL.to_vec()
    } else {
        plan.resources.clone()
    };

    info!(
        requests = plan.requests,
        concurrency = plan.concurrency,
        kind = %plan.kind,
        "Starting load test"
    );

    let started = Instant::now();
    stream::iter(0..plan.requests)
        .for_each_concurrent(plan.concurrency.max(1), |i| {
            let resource = resources[i % resources.len()];
            let summary = summary.clone();
            async move {
                let request_started = Instant::now();
                let outcome = client
                    .get_json::<serde_json::Value>(resource.path(), &resource.query(&[]), plan.kind)
                    .await
                    .map(|_| ());
                if let Err(ref e) = outcome {
                    debug!(resource = %resource, error = %e, "Request failed");
                }
                summary.lock().record(&outcome, request_started.elapsed());
            }
        })
        .await;

    let mut summary = summary.lock().clone();
    summary.elapsed = started.elapsed();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, PoliciesConfig};
    use crate::ratelimit::RateLimiters;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_summary_percentiles() {
        let mut summary = LoadTestSummary::default();
        for ms in [40u64, 10, 30, 20] {
            summary.record(&Ok(()), Duration::from_millis(ms));
        }

        assert_eq!(summary.latency_percentile(50.0), Some(Duration::from_millis(20)));
        assert_eq!(summary.latency_percentile(100.0), Some(Duration::from_millis(40)));
        assert_eq!(summary.latency_percentile(0.0), Some(Duration::from_millis(10)));
        assert_eq!(LoadTestSummary::default().latency_percentile(50.0), None);
    }

    #[test]
    fn test_summary_classifies_outcomes() {
        let mut summary = LoadTestSummary::default();
        summary.record(&Ok(()), Duration::ZERO);
        summary.record(
            &Err(ClientError::RateLimitExceeded {
                url: "http://localhost/api/vips/".to_string(),
            }),
            Duration::ZERO,
        );
        summary.record(&Err(ClientError::InvalidUrl("x".to_string())), Duration::ZERO);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.rate_limited, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 3);
    }

    #[tokio::test]
    async fn test_run_against_server() {
        let app = Router::new()
            .route("/api/firewalls/", get(|| async { Json(json!({ "items": [], "total_count": 0 })) }))
            .route("/api/vips/", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ApiConfig {
            base_url: format!("http://{}/api", addr),
            request_timeout_ms: 5_000,
        };
        let client =
            InventoryClient::new(&config, Arc::new(RateLimiters::new(&PoliciesConfig::default()))).unwrap();

        let plan = LoadTestPlan {
            requests: 10,
            concurrency: 4,
            kind: LimiterKind::Bulk,
            resources: vec![Resource::Firewalls, Resource::Vips],
        };
        let summary = run(&client, &plan).await;

        assert_eq!(summary.total(), 10);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.rate_limited, 5);
        assert_eq!(summary.failed, 0);
        assert!(client.limiters().get(LimiterKind::Bulk).key_count() >= 1);
    }

    #[tokio::test]
    async fn test_run_sends_route_defaults() {
        async fn routes(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<serde_json::Value>) {
            let status = if params.get("include_vdom").map(String::as_str) == Some("true") {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(json!({ "items": [], "total_count": 0 })))
        }

        let app = Router::new().route("/api/routes/", get(routes));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ApiConfig {
            base_url: format!("http://{}/api", addr),
            request_timeout_ms: 5_000,
        };
        let client =
            InventoryClient::new(&config, Arc::new(RateLimiters::new(&PoliciesConfig::default()))).unwrap();

        let plan = LoadTestPlan {
            requests: 5,
            concurrency: 2,
            kind: LimiterKind::Bulk,
            resources: vec![Resource::Routes],
        };
        let summary = run(&client, &plan).await;

        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.failed, 0);

        let key = format!("http://{}/api/routes/?include_vdom=true", addr);
        assert_eq!(client.limiters().get(LimiterKind::Bulk).current_count(key.as_str()), Some(5));
    }
}
