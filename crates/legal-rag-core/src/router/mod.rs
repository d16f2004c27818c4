//! Router (component C): classifies a query into a collection + candidate
//! document + smart filters, with confidence banding.

pub mod filters;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::clarification::ClarificationLevel;
use crate::corpus::{CorpusStore, RouterQuestion, RouterQuestionStatus};
use crate::embedding::EmbeddingProvider;
use crate::errors::{RetrievalError, Result};
use crate::retrieval::{cosine_similarity, Filters};
use crate::session::Session;

pub use filters::{filters_from_smart_filters, filters_pinned_to_document};
pub use scoring::{confidence_level, is_followup_query, override_fires, title_boost};

/// Below this, even the best-scoring collection carries no real signal;
/// the router reports `NoMatch` instead of forcing an L4 clarification
/// offer (clarification's own "L4 empty → canned reply" path handles the
/// symmetric case where L4 options end up empty).
const NO_MATCH_FLOOR: f32 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    MediumHigh,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterStatus {
    Routed,
    ClarificationNeeded(ClarificationLevel),
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub status: RouterStatus,
    pub confidence_level: ConfidenceLevel,
    pub target_collection: Option<String>,
    pub target_doc_id: Option<String>,
    pub confidence: f32,
    pub original_confidence: f32,
    pub was_overridden: bool,
    pub inferred_filters: Filters,
    pub matched_example: Option<String>,
    pub source_procedure: Option<String>,
    pub all_scores: Vec<(String, f32)>,
}

struct BestMatch {
    collection_id: String,
    question: RouterQuestion,
    score: f32,
}

/// Immutable in-memory projection of active `RouterQuestion`s plus their
/// embeddings, materialized into a dense list per collection.
pub struct Router {
    corpus: Arc<CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    question_index: HashMap<String, Vec<(RouterQuestion, Vec<f32>)>>,
}

impl Router {
    /// Builds the projection from every collection's active, embedded
    /// `RouterQuestion`s. Questions without a precomputed embedding are
    /// skipped (not yet materialized by the offline build tool) and
    /// logged, rather than failing the whole build.
    pub fn build(corpus: Arc<CorpusStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let mut question_index: HashMap<String, Vec<(RouterQuestion, Vec<f32>)>> = HashMap::new();
        for question in corpus.all_router_questions() {
            if question.status != RouterQuestionStatus::Active {
                continue;
            }
            let Some(embedding) = question.embedding.clone() else {
                debug!(id = %question.id, "router question has no embedding yet, skipping");
                continue;
            };
            question_index
                .entry(question.collection_id.clone())
                .or_default()
                .push((question.clone(), embedding));
        }
        Self {
            corpus,
            embedder,
            question_index,
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.question_index.is_empty()
    }

    pub async fn route(&self, query: &str, session: &Session) -> Result<RouteDecision> {
        if !self.is_ready() {
            return Err(RetrievalError::RouterNotReady);
        }

        let query_embedding = self.embedder.embed(query).await?;

        let mut best_per_collection = self.best_match_per_collection(&query_embedding);
        self.apply_title_boost(&mut best_per_collection, query);

        let all_scores: Vec<(String, f32)> = best_per_collection
            .iter()
            .map(|b| (b.collection_id.clone(), b.score))
            .collect();

        let global_best = best_per_collection
            .into_iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap());

        // Step 4: follow-up bypass short-circuits scoring entirely.
        if session.has_prior_success() && is_followup_query(query) {
            let target_collection = session.last_successful_collection.clone();
            return Ok(RouteDecision {
                status: RouterStatus::Routed,
                confidence_level: ConfidenceLevel::High,
                target_collection,
                target_doc_id: session.last_successful_doc_id.clone(),
                confidence: scoring::FOLLOWUP_CONFIDENCE,
                original_confidence: scoring::FOLLOWUP_CONFIDENCE,
                was_overridden: false,
                inferred_filters: session.last_successful_filters.clone(),
                matched_example: None,
                source_procedure: session.last_successful_doc_id.clone(),
                all_scores,
            });
        }

        let Some(global_best) = global_best else {
            return Ok(RouteDecision {
                status: RouterStatus::NoMatch,
                confidence_level: ConfidenceLevel::Low,
                target_collection: None,
                target_doc_id: None,
                confidence: 0.0,
                original_confidence: 0.0,
                was_overridden: false,
                inferred_filters: Filters::default(),
                matched_example: None,
                source_procedure: None,
                all_scores,
            });
        };

        let current_confidence = global_best.score;

        // Step 5: stateful override.
        let (final_confidence, was_overridden, target_collection, target_doc_id, inferred_filters) =
            if override_fires(current_confidence, session.last_successful_confidence) {
                (
                    current_confidence.max(scoring::OVERRIDE_CONFIDENCE_FLOOR),
                    true,
                    session.last_successful_collection.clone(),
                    session.last_successful_doc_id.clone(),
                    session.last_successful_filters.clone(),
                )
            } else {
                (
                    current_confidence,
                    false,
                    Some(global_best.collection_id.clone()),
                    Some(global_best.question.doc_id.clone()),
                    filters_from_smart_filters(&global_best.question.smart_filters),
                )
            };

        if final_confidence < NO_MATCH_FLOOR {
            return Ok(RouteDecision {
                status: RouterStatus::NoMatch,
                confidence_level: ConfidenceLevel::Low,
                target_collection: None,
                target_doc_id: None,
                confidence: final_confidence,
                original_confidence: current_confidence,
                was_overridden: false,
                inferred_filters: Filters::default(),
                matched_example: None,
                source_procedure: None,
                all_scores,
            });
        }

        let level = confidence_level(final_confidence);
        let status = match level {
            ConfidenceLevel::High => RouterStatus::Routed,
            ConfidenceLevel::MediumHigh => {
                RouterStatus::ClarificationNeeded(ClarificationLevel::L2)
            }
            ConfidenceLevel::Medium => RouterStatus::ClarificationNeeded(ClarificationLevel::L3),
            ConfidenceLevel::Low => RouterStatus::ClarificationNeeded(ClarificationLevel::L4),
        };

        Ok(RouteDecision {
            status,
            confidence_level: level,
            target_collection,
            target_doc_id,
            confidence: final_confidence,
            original_confidence: current_confidence,
            was_overridden,
            inferred_filters,
            matched_example: Some(global_best.question.text.clone()),
            source_procedure: Some(global_best.question.doc_id.clone()),
            all_scores,
        })
    }

    fn best_match_per_collection(&self, query_embedding: &[f32]) -> Vec<BestMatch> {
        self.question_index
            .iter()
            .filter_map(|(collection_id, questions)| {
                questions
                    .iter()
                    .map(|(q, embedding)| (q, cosine_similarity(query_embedding, embedding)))
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                    .map(|(q, score)| BestMatch {
                        collection_id: collection_id.clone(),
                        question: q.clone(),
                        score,
                    })
            })
            .collect()
    }

    /// Step 3: title-boosting, applied in place, then the caller re-derives
    /// the global best from the boosted scores.
    fn apply_title_boost(&self, candidates: &mut [BestMatch], query: &str) {
        for candidate in candidates.iter_mut() {
            let Ok(doc) = self
                .corpus
                .get_document(&candidate.collection_id, &candidate.question.doc_id)
            else {
                continue;
            };
            candidate.score += title_boost(&doc.title, query, doc.is_core_procedure());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicTestProvider;
    use crate::retrieval::Filters;
    use std::fs;
    use tempfile::TempDir;

    fn write_corpus(tmp: &TempDir) {
        let root = tmp.path();
        for (collection, doc_id, title, question_text) in [
            (
                "quy_trinh_cap_ho_tich_cap_xa",
                "khai-sinh",
                "Đăng ký khai sinh",
                "Thủ tục đăng ký khai sinh cần giấy tờ gì?",
            ),
            (
                "cong_chung",
                "di-chuc",
                "Chứng thực di chúc",
                "Khi lập di chúc thì có phải đóng phí khi chứng thực không",
            ),
        ] {
            let doc_dir = root
                .join("collections")
                .join(collection)
                .join("documents")
                .join(doc_id);
            fs::create_dir_all(&doc_dir).unwrap();
            fs::write(
                doc_dir.join("content.json"),
                serde_json::json!({
                    "title": title,
                    "metadata": {"has_form": false},
                    "chunks": [{"chunk_index": 0, "content": "noi dung", "embedding": []}]
                })
                .to_string(),
            )
            .unwrap();

            let router_dir = root.join("collections").join(collection).join("router_data");
            fs::create_dir_all(&router_dir).unwrap();
            fs::write(
                router_dir.join("questions.json"),
                serde_json::json!({
                    "questions": [{
                        "id": format!("{doc_id}-q0"),
                        "text": question_text,
                        "doc_id": doc_id,
                        "question_type": "main",
                        "priority_score": 1.0,
                        "status": "active",
                    }]
                })
                .to_string(),
            )
            .unwrap();
        }
    }

    async fn build_router(tmp: &TempDir) -> (Router, Arc<dyn EmbeddingProvider>) {
        write_corpus(tmp);
        let corpus = Arc::new(CorpusStore::load(tmp.path()).unwrap());
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(DeterministicTestProvider { dim: 1024 });

        // Materialize embeddings onto the in-memory RouterQuestions the way
        // the offline build tool would, since CorpusStore itself only
        // reads whatever `embedding` field is already in questions.json.
        let mut questions_by_collection: HashMap<String, Vec<RouterQuestion>> = HashMap::new();
        for q in corpus.all_router_questions() {
            let mut q = q.clone();
            q.embedding = Some(embedder.embed(&q.text).await.unwrap());
            questions_by_collection
                .entry(q.collection_id.clone())
                .or_default()
                .push(q);
        }

        let mut question_index = HashMap::new();
        for (collection_id, questions) in questions_by_collection {
            question_index.insert(
                collection_id,
                questions
                    .into_iter()
                    .map(|q| {
                        let embedding = q.embedding.clone().unwrap();
                        (q, embedding)
                    })
                    .collect(),
            );
        }

        (
            Router {
                corpus,
                embedder: embedder.clone(),
                question_index,
            },
            embedder,
        )
    }

    #[tokio::test]
    async fn exact_question_match_routes_with_high_confidence() {
        let tmp = TempDir::new().unwrap();
        let (router, _embedder) = build_router(&tmp).await;
        let session = Session::new("s1");
        let decision = router
            .route("Thủ tục đăng ký khai sinh cần giấy tờ gì?", &session)
            .await
            .unwrap();
        assert_eq!(decision.status, RouterStatus::Routed);
        assert_eq!(
            decision.target_collection.as_deref(),
            Some("quy_trinh_cap_ho_tich_cap_xa")
        );
    }

    #[tokio::test]
    async fn followup_bypasses_scoring_to_prior_collection() {
        let tmp = TempDir::new().unwrap();
        let (router, _embedder) = build_router(&tmp).await;
        let mut session = Session::new("s1");
        session.record_success(
            "quy_trinh_cap_ho_tich_cap_xa",
            Some("khai-sinh".to_string()),
            0.9,
            Filters::default(),
        );
        let decision = router.route("có tốn phí không?", &session).await.unwrap();
        assert_eq!(decision.status, RouterStatus::Routed);
        assert_eq!(
            decision.target_collection.as_deref(),
            Some("quy_trinh_cap_ho_tich_cap_xa")
        );
        assert_eq!(decision.confidence, scoring::FOLLOWUP_CONFIDENCE);
        assert!(!decision.was_overridden);
    }

    #[tokio::test]
    async fn unready_router_reports_not_ready() {
        let router = Router {
            corpus: Arc::new(CorpusStore::load({
                let tmp = TempDir::new().unwrap();
                fs::create_dir_all(tmp.path().join("collections")).unwrap();
                tmp.path().to_path_buf()
            }).unwrap()),
            embedder: Arc::new(DeterministicTestProvider { dim: 1024 }),
            question_index: HashMap::new(),
        };
        let err = router
            .route("bất kỳ câu hỏi nào", &Session::new("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::RouterNotReady));
    }
}
