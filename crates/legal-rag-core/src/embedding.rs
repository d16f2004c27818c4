//! Embedding provider contract.
//!
//! The embedding model is an external collaborator specified only by its
//! textual/vector I/O contract. This trait is the seam the router, vector
//! index population, and context intent classification call across.

use async_trait::async_trait;

use crate::errors::{RetrievalError, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// HTTP-backed embedding provider calling an external `/v1/embeddings`
/// endpoint.
pub struct HttpEmbeddingProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(serde::Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(self.embeddings_url())
            .json(&EmbeddingRequest { input: text })
            .send()
            .await
            .map_err(|_| RetrievalError::EmbeddingUnavailable)?;

        if !response.status().is_success() {
            return Err(RetrievalError::EmbeddingUnavailable);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|_| RetrievalError::EmbeddingUnavailable)?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(RetrievalError::EmbeddingUnavailable)
    }
}

/// A fixed-vocabulary provider used in tests and by the CLI smoke-test:
/// deterministic, no network call, so routing behavior is exercisable
/// without an external model.
pub struct DeterministicTestProvider {
    pub dim: usize,
}

#[async_trait]
impl EmbeddingProvider for DeterministicTestProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dim] += byte as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}
