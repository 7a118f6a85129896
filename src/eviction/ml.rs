// ML-backed eviction policy (spec section 4.8 and section 6, "ML service
// contract"). POSTs a feature batch to an external predictor and evicts the
// keys least likely to be re-accessed; falls back to LRU transparently on
// any transport or deserialization failure.
//
// The `reqwest::Client` construction mirrors the teacher's
// `ConsulDiscovery::new` (`networking::discovery::consul`): a fixed request
// timeout baked into the client rather than threaded through every call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::eviction::{EvictionPolicy, KeyFeatures, LruPolicy};

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    keys: &'a [KeyFeatures],
    #[serde(rename = "currentTime")]
    current_time: u64,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    key: String,
    probability: f64,
    #[serde(default, rename = "willBeAccessed")]
    #[allow(dead_code)]
    will_be_accessed: bool,
}

pub struct MlPolicy {
    base_url: String,
    client: reqwest::Client,
    fallback: LruPolicy,
}

impl MlPolicy {
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            client,
            fallback: LruPolicy::new(),
        }
    }

    async fn predict(&self, candidates: &[KeyFeatures], count: usize) -> Option<Vec<String>> {
        let body = PredictRequest {
            keys: candidates,
            current_time: crate::access::now_ms(),
        };
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let mut parsed: PredictResponse = response.json().await.ok()?;
        parsed
            .predictions
            .sort_by(|a, b| a.probability.partial_cmp(&b.probability).unwrap_or(std::cmp::Ordering::Equal));
        Some(parsed.predictions.into_iter().take(count).map(|p| p.key).collect())
    }
}

#[async_trait]
impl EvictionPolicy for MlPolicy {
    async fn select_victims(&self, candidates: &[KeyFeatures], count: usize) -> Vec<String> {
        match self.predict(candidates, count).await {
            Some(victims) if !victims.is_empty() || candidates.is_empty() => victims,
            _ => {
                warn!(policy = "ml", "prediction unavailable, falling back to lru");
                self.fallback.select_victims(candidates, count).await
            }
        }
    }

    fn record_access(&self, key: &str) {
        self.fallback.record_access(key);
    }

    fn remove(&self, key: &str) {
        self.fallback.remove(key);
    }

    fn name(&self) -> &'static str {
        "ml"
    }
}
