//! Reranker client (spec.md §4.6 step 5, §6): an HTTP cross-encoder used to
//! re-score the fused top-K candidates before the Wilson blend. Circuit
//! broken like the lexical/vector adapters; a reranker outage degrades the
//! search path to its pre-rerank ranking rather than failing the request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::circuit::CircuitBreaker;
use crate::error::SearchStageError;

const STAGE: &str = "reranker";

#[derive(Debug, Clone, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultEntry>,
}

/// The reranker's relevance score field is not stably named across the
/// deployments this talks to, so both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
struct RerankResultEntry {
    index: usize,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    relevance_score: Option<f32>,
}

impl RerankResultEntry {
    fn score(&self) -> f32 {
        self.score.or(self.relevance_score).unwrap_or(0.0)
    }
}

/// A single reranked candidate: `index` into the original `documents` slice
/// passed to [`RerankerClient::rerank`], and the cross-encoder's score.
#[derive(Debug, Clone, Copy)]
pub struct RerankHit {
    pub index: usize,
    pub score: f32,
}

pub struct RerankerClient {
    http: reqwest::Client,
    endpoint: String,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl RerankerClient {
    pub fn new(endpoint: impl Into<String>, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            breaker,
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Reranks `documents` against `query`, returning hits sorted by score
    /// descending. The search service treats any `Err` as "skip rerank,
    /// keep the fused order" rather than a request failure.
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<RerankHit>, SearchStageError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        if self.breaker.is_open() {
            return Err(SearchStageError::CircuitOpen {
                stage: STAGE.to_string(),
            });
        }

        let body = RerankRequest { query, documents };
        let call = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send();

        let result = tokio::time::timeout(self.timeout, call).await;

        let response = match result {
            Err(_) => {
                self.breaker.record_failure();
                return Err(SearchStageError::Timeout {
                    stage: STAGE.to_string(),
                });
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                return Err(SearchStageError::Transient {
                    stage: STAGE.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(Ok(r)) => r,
        };

        let parsed: Result<RerankResponse, _> = response.json().await;
        match parsed {
            Ok(body) => {
                self.breaker.record_success();
                let mut hits: Vec<RerankHit> = body
                    .results
                    .iter()
                    .filter(|r| r.index < documents.len())
                    .map(|r| RerankHit {
                        index: r.index,
                        score: r.score(),
                    })
                    .collect();
                hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                Ok(hits)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(SearchStageError::Serialization {
                    stage: STAGE.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}
