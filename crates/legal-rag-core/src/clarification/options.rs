//! Option generation per clarification level.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clarification::{ClarificationLevel, ClarificationOutcome, ClarificationState};
use crate::corpus::{CorpusStore, RouterQuestionStatus};
use crate::embedding::EmbeddingProvider;
use crate::retrieval::cosine_similarity;

const L2_TOP_N: usize = 5;
const L3_CAP: usize = 5;
const L4_SCORE_THRESHOLD: f32 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClarificationOptionAction {
    ProceedWithCollection,
    ProceedWithDocument,
    ShowDocumentQuestions,
    ManualInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationOption {
    pub id: String,
    pub title: String,
    pub description: String,
    pub action: ClarificationOptionAction,
    pub collection: Option<String>,
    pub document: Option<String>,
}

pub struct OptionGenerator {
    corpus: Arc<CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl OptionGenerator {
    pub fn new(corpus: Arc<CorpusStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { corpus, embedder }
    }

    /// L2: top-N active questions of the candidate document by
    /// priority_score, near-duplicates removed.
    fn l2_options(&self, collection_id: &str, doc_id: &str) -> Vec<ClarificationOption> {
        let mut questions: Vec<_> = self
            .corpus
            .router_questions(collection_id)
            .iter()
            .filter(|q| q.doc_id == doc_id && q.status == RouterQuestionStatus::Active)
            .collect();
        questions.sort_by(|a, b| b.priority_score.partial_cmp(&a.priority_score).unwrap());

        let mut seen_normalized: Vec<String> = Vec::new();
        let mut options = Vec::new();
        for q in questions {
            let normalized = q.text.to_lowercase();
            if seen_normalized
                .iter()
                .any(|s| s == &normalized || s.starts_with(&normalized) || normalized.starts_with(s.as_str()))
            {
                continue;
            }
            seen_normalized.push(normalized);
            options.push(ClarificationOption {
                id: q.id.clone(),
                title: q.text.clone(),
                description: q.text.clone(),
                action: ClarificationOptionAction::ShowDocumentQuestions,
                collection: Some(collection_id.to_string()),
                document: Some(doc_id.to_string()),
            });
            if options.len() >= L2_TOP_N {
                break;
            }
        }
        options
    }

    /// L3: embed the candidate document's title and similarity-match
    /// within the collection; exclude duplicate sources; cap at 5; boost
    /// core procedures.
    async fn l3_options(
        &self,
        collection_id: &str,
        candidate_doc_id: &str,
    ) -> anyhow::Result<Vec<ClarificationOption>> {
        let candidate = self.corpus.get_document(collection_id, candidate_doc_id)?;
        let candidate_title_embedding = self.embedder.embed(&candidate.title).await?;

        let mut scored: Vec<(f32, &crate::corpus::Document)> = Vec::new();
        let mut seen_docs = std::collections::HashSet::new();
        for doc in self.corpus.list_documents(collection_id) {
            if doc.doc_id == candidate_doc_id || !seen_docs.insert(doc.doc_id.clone()) {
                continue;
            }
            let title_embedding = self.embedder.embed(&doc.title).await?;
            let mut score = cosine_similarity(&candidate_title_embedding, &title_embedding);
            if doc.is_core_procedure() {
                score += 0.1;
            }
            scored.push((score, doc));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.truncate(L3_CAP);

        Ok(scored
            .into_iter()
            .map(|(_, doc)| ClarificationOption {
                id: doc.doc_id.clone(),
                title: doc.title.clone(),
                description: doc.title.clone(),
                action: ClarificationOptionAction::ProceedWithDocument,
                collection: Some(collection_id.to_string()),
                document: Some(doc.doc_id.clone()),
            })
            .collect())
    }

    /// L4: collections whose best-per-collection score exceeds 0.20,
    /// ordered by score, each paired with a sample main question.
    fn l4_options(&self, all_scores: &[(String, f32)]) -> Vec<ClarificationOption> {
        let mut candidates: Vec<&(String, f32)> =
            all_scores.iter().filter(|(_, s)| *s > L4_SCORE_THRESHOLD).collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        candidates
            .into_iter()
            .map(|(collection_id, _)| {
                let sample_question = self
                    .corpus
                    .router_questions(collection_id)
                    .iter()
                    .find(|q| {
                        q.question_type == crate::corpus::RouterQuestionType::Main
                            && q.status == RouterQuestionStatus::Active
                    })
                    .map(|q| q.text.clone())
                    .unwrap_or_default();
                let display_name = self
                    .corpus
                    .list_collections()
                    .into_iter()
                    .find(|c| &c.id == collection_id)
                    .map(|c| c.display_name.clone())
                    .unwrap_or_else(|| collection_id.clone());
                ClarificationOption {
                    id: collection_id.clone(),
                    title: display_name,
                    description: sample_question,
                    action: ClarificationOptionAction::ProceedWithCollection,
                    collection: Some(collection_id.clone()),
                    document: None,
                }
            })
            .collect()
    }

    /// Generate options for `level`, escalating to the next broader level
    /// when the attempted level would offer zero options.
    pub async fn generate(
        &self,
        level: ClarificationLevel,
        candidate_collection: Option<&str>,
        candidate_doc_id: Option<&str>,
        all_scores: &[(String, f32)],
        original_query: &str,
    ) -> anyhow::Result<ClarificationOutcome> {
        match level {
            ClarificationLevel::L2 => {
                let (collection, doc_id) = match (candidate_collection, candidate_doc_id) {
                    (Some(c), Some(d)) => (c, d),
                    _ => {
                        return self
                            .generate(
                                ClarificationLevel::L3,
                                candidate_collection,
                                candidate_doc_id,
                                all_scores,
                                original_query,
                            )
                            .await
                    }
                };
                let options = self.l2_options(collection, doc_id);
                if options.is_empty() {
                    return self
                        .generate(
                            ClarificationLevel::L3,
                            candidate_collection,
                            candidate_doc_id,
                            all_scores,
                            original_query,
                        )
                        .await;
                }
                Ok(ClarificationOutcome::Clarify(ClarificationState::new(
                    ClarificationLevel::L2,
                    Some(collection.to_string()),
                    Some(doc_id.to_string()),
                    options,
                    original_query,
                )))
            }
            ClarificationLevel::L3 => {
                let (collection, doc_id) = match (candidate_collection, candidate_doc_id) {
                    (Some(c), Some(d)) => (c, d),
                    _ => {
                        return self
                            .generate(
                                ClarificationLevel::L4,
                                candidate_collection,
                                None,
                                all_scores,
                                original_query,
                            )
                            .await
                    }
                };
                let options = self.l3_options(collection, doc_id).await?;
                if options.is_empty() {
                    return self
                        .generate(
                            ClarificationLevel::L4,
                            candidate_collection,
                            None,
                            all_scores,
                            original_query,
                        )
                        .await;
                }
                Ok(ClarificationOutcome::Clarify(ClarificationState::new(
                    ClarificationLevel::L3,
                    Some(collection.to_string()),
                    None,
                    options,
                    original_query,
                )))
            }
            ClarificationLevel::L4 => {
                let options = self.l4_options(all_scores);
                if options.is_empty() {
                    return Ok(ClarificationOutcome::NoInfoAvailable);
                }
                Ok(ClarificationOutcome::Clarify(ClarificationState::new(
                    ClarificationLevel::L4,
                    None,
                    None,
                    options,
                    original_query,
                )))
            }
            ClarificationLevel::L1 => {
                // L1 is reached only as a fallback above L4: an explicit,
                // option-less "which collection?" prompt.
                Ok(ClarificationOutcome::Clarify(ClarificationState::new(
                    ClarificationLevel::L1,
                    None,
                    None,
                    Vec::new(),
                    original_query,
                )))
            }
        }
    }
}
