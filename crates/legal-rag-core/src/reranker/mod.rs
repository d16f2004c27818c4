//! Reranker (component G): cross-encoder rescoring of the vector index's
//! top-K candidates, talking to an external scoring model over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::Result;
use crate::retrieval::ScoredChunk;

/// Cross-encoder input sequence length cap.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>>;
}

pub struct HttpReranker {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RerankPair<'a> {
    query: &'a str,
    passage: &'a str,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    pairs: Vec<RerankPair<'a>>,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn rerank_url(&self) -> String {
        format!("{}/v1/rerank", self.base_url.trim_end_matches('/'))
    }

    fn truncate(content: &str) -> &str {
        let end = content
            .char_indices()
            .nth(MAX_SEQUENCE_LENGTH)
            .map(|(idx, _)| idx)
            .unwrap_or(content.len());
        &content[..end]
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let pairs: Vec<RerankPair> = candidates
            .iter()
            .map(|c| RerankPair {
                query,
                passage: Self::truncate(&c.chunk.content),
            })
            .collect();

        let response = self
            .client
            .post(self.rerank_url())
            .json(&RerankRequest { pairs })
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            _ => {
                warn!("reranker unavailable, passing vector order through");
                return Ok(passthrough(candidates));
            }
        };

        let parsed: RerankResponse = match response.json().await {
            Ok(p) => p,
            Err(_) => {
                warn!("reranker returned an unparseable response, passing vector order through");
                return Ok(passthrough(candidates));
            }
        };

        if parsed.scores.len() != candidates.len() {
            warn!("reranker returned a mismatched score count, passing vector order through");
            return Ok(passthrough(candidates));
        }

        let mut rescored: Vec<(ScoredChunk, f32)> =
            candidates.into_iter().zip(parsed.scores).collect();
        rescored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.0.score
                        .partial_cmp(&a.0.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        Ok(rescored.into_iter().map(|(c, _)| c).collect())
    }
}

/// Degraded-mode reranker used on `RerankerUnavailable`: vector order is
/// preserved, tie-broken by higher vector score first (which is already
/// the vector index's own ordering).
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
        Ok(passthrough(candidates))
    }
}

fn passthrough(candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    candidates
}
