//! Retrieval core for a Vietnamese administrative-procedure question
//! answering assistant: corpus store, vector index, router, clarification
//! engine, session store, context assembler, reranker, form detector and
//! the orchestrator that wires them into a per-turn pipeline.
//!
//! The LLM runtime, embedding model and cross-encoder model are external
//! collaborators this crate calls across HTTP traits (`generator`,
//! `embedding`, `reranker::Reranker`); this crate owns no model process.

pub mod clarification;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod errors;
pub mod forms;
pub mod generator;
pub mod orchestrator;
pub mod reranker;
pub mod retrieval;
pub mod router;
pub mod session;
pub mod telemetry;

pub use config::RetrievalConfig;
pub use corpus::{
    Chunk, Collection, CollectionStatus, CorpusStore, Document, DocumentMetadata, RouterQuestion,
    RouterQuestionStatus, RouterQuestionType, SmartFilters,
};
pub use embedding::{DeterministicTestProvider, EmbeddingProvider, HttpEmbeddingProvider};
pub use errors::{RetrievalError, Result};
pub use generator::{Generator, HttpGenerator};
pub use orchestrator::{
    ClarificationPayload, ClarificationResponse, ContextInfo, Orchestrator, OrchestratorConfig,
    QueryRequest, QueryResponse, RoutingInfo,
};
pub use reranker::{HttpReranker, PassthroughReranker, Reranker};
pub use retrieval::{Filters, ScoredChunk, VectorIndex};
pub use router::{ConfidenceLevel, RouteDecision, Router, RouterStatus};
pub use session::{Session, SessionStore, SessionStoreConfig};
