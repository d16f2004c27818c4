//! Central error type for the retrieval core.
//!
//! Calling code branches on the specific failure (retry, degrade, fail
//! fast, or fabricate a canned reply), so a single `thiserror`-derived enum
//! keeps that routing explicit instead of string-matching `anyhow`
//! context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding model unavailable")]
    EmbeddingUnavailable,

    #[error("router projection not ready")]
    RouterNotReady,

    #[error("corpus store corrupt: {0}")]
    CorpusCorrupt(String),

    #[error("document not found: {collection_id}/{doc_id}")]
    NotFound {
        collection_id: String,
        doc_id: String,
    },

    #[error("filter produced no candidates")]
    FilterEmpty,

    #[error("reranker unavailable")]
    RerankerUnavailable,

    #[error("assembled prompt exceeds context budget ({needed} > {budget})")]
    PromptTooLarge { needed: usize, budget: usize },

    #[error("generator timed out")]
    GeneratorTimeout,

    #[error("session store miss for session {0}")]
    SessionMiss(String),

    #[error("no matching collection or document found")]
    NoMatch,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
