//! Orchestrator (component I): wires router -> search -> rerank -> context
//! -> generator -> form detection, and owns the per-turn lifecycle: store
//! -> plan -> early-exit check -> retrieve -> build context -> generate ->
//! update stats.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::clarification::{
    transition, ClarificationLevel, ClarificationOption, ClarificationOptionAction,
    ClarificationOutcome, ClarificationState, MachineState, OptionGenerator,
};
use crate::config::RetrievalConfig;
use crate::context::ContextAssembler;
use crate::corpus::CorpusStore;
use crate::embedding::EmbeddingProvider;
use crate::errors::RetrievalError;
use crate::forms::{self, FormUrlBuilder, PathFormUrlBuilder};
use crate::generator::{build_prompt, Generator};
use crate::reranker::Reranker;
use crate::retrieval::{Filters, VectorIndex};
use crate::router::{self, ConfidenceLevel, RouteDecision, Router, RouterStatus};
use crate::session::{Session, SessionStore, SessionStoreConfig};

const APOLOGY_NO_INFO: &str = "Tài liệu không đề cập vấn đề này.";
const APOLOGY_NOT_READY: &str = "Hệ thống tra cứu đang tạm thời gián đoạn, vui lòng thử lại sau.";
const APOLOGY_TOO_LARGE: &str = "Câu hỏi quá dài để xử lý, vui lòng rút ngắn câu hỏi.";
const NO_INFO_FOUND: &str = "Không tìm thấy thông tin phù hợp.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub enabled: bool,
    pub enable_metrics: bool,
    pub session_timeout_seconds: u64,
}

impl From<&RetrievalConfig> for OrchestratorConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            enabled: true,
            enable_metrics: true,
            session_timeout_seconds: config.session_idle_minutes * 60,
        }
    }
}

// ---- External interfaces ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_k: Option<usize>,
    /// Filter pinned by a resolved clarification selection (component D:
    /// an L2 question or L3 document choice pins retrieval to that
    /// document), taking precedence over whatever the router infers for
    /// this turn.
    #[serde(default)]
    pub pinned_filters: Option<Filters>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum QueryResponse {
    #[serde(rename = "answer")]
    Answer {
        answer: String,
        context_info: ContextInfo,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        form_attachments: Vec<forms::FormAttachment>,
        routing_info: RoutingInfo,
        session_id: String,
        processing_time: f64,
        #[serde(skip_serializing_if = "is_false")]
        incomplete: bool,
    },
    #[serde(rename = "clarification_needed")]
    ClarificationNeeded {
        clarification: ClarificationPayload,
        session_id: String,
        processing_time: f64,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextInfo {
    pub source_documents: Vec<String>,
    pub source_collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingInfo {
    pub confidence: f32,
    pub original_confidence: f32,
    pub was_overridden: bool,
    pub target_collection: Option<String>,
    pub inferred_filters: FiltersDto,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FiltersDto {
    pub exact_title: Vec<String>,
    pub doc_id: Vec<String>,
    pub agency: Vec<String>,
}

impl From<&Filters> for FiltersDto {
    fn from(f: &Filters) -> Self {
        Self {
            exact_title: f.exact_title.clone(),
            doc_id: f.doc_id.clone(),
            agency: f.agency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClarificationPayload {
    pub message: String,
    pub options: Vec<ClarificationOption>,
    pub level: ClarificationLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClarificationResponse {
    pub session_id: String,
    pub selected_option_id: String,
    pub original_question: Option<String>,
}

// ---- Orchestrator ------------------------------------------------------

pub struct Orchestrator {
    corpus: Arc<CorpusStore>,
    router: Arc<Router>,
    vector_index: Arc<VectorIndex>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn EmbeddingProvider>,
    option_generator: Arc<OptionGenerator>,
    sessions: Arc<SessionStore>,
    url_builder: Arc<dyn FormUrlBuilder>,
    config: RetrievalConfig,
    orchestrator_config: OrchestratorConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        corpus: Arc<CorpusStore>,
        router: Arc<Router>,
        vector_index: Arc<VectorIndex>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        let orchestrator_config = OrchestratorConfig::from(&config);
        let option_generator = Arc::new(OptionGenerator::new(corpus.clone(), embedder.clone()));
        let sessions = Arc::new(SessionStore::new(SessionStoreConfig {
            idle_ttl: Duration::from_secs(orchestrator_config.session_timeout_seconds),
        }));
        let url_builder: Arc<dyn FormUrlBuilder> = Arc::new(PathFormUrlBuilder {
            base_path: config.form_base_path.clone(),
        });
        Self {
            corpus,
            router,
            vector_index,
            reranker,
            generator,
            embedder,
            option_generator,
            sessions,
            url_builder,
            config,
            orchestrator_config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Per-turn entry point. Never returns an `Err`: every failure path is
    /// folded into a well-formed response envelope rather than an
    /// exception bubbling to the chat surface.
    pub async fn handle_query(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session_lock = self.sessions.get_or_create(&session_id);

        // Hold the per-session write lock for the duration of this turn's
        // session-mutating work, so a second concurrent turn for the same
        // session waits for this one to commit.
        let mut session = session_lock.write().await;
        session.push_history("user", &request.query);

        let response = self.process_turn(&request, &session_id, &mut session).await;

        let elapsed = started.elapsed().as_secs_f64();
        stamp_processing_time(response, elapsed)
    }

    async fn process_turn(
        &self,
        request: &QueryRequest,
        session_id: &str,
        session: &mut Session,
    ) -> QueryResponse {
        if !self.orchestrator_config.enabled || !self.config.use_routing {
            return self.flat_search_answer(request, session_id, session).await;
        }

        let decision = match self.router.route(&request.query, session).await {
            Ok(d) => d,
            Err(RetrievalError::RouterNotReady) => {
                warn!("router not ready, returning canned apology");
                return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new());
            }
            Err(RetrievalError::EmbeddingUnavailable) => {
                warn!("embedding model unavailable, failing turn");
                return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new());
            }
            Err(e) => {
                warn!("unexpected router error: {e}");
                return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new());
            }
        };

        self.apply_low_confidence_tracking(&decision, session);

        let current_state = current_machine_state(session);
        let next_state = transition(current_state, &decision);

        match decision.status {
            RouterStatus::Routed => {
                debug_assert_eq!(next_state, MachineState::AnswerReady);
                self.answer_for_decision(request, session_id, session, &decision).await
            }
            RouterStatus::ClarificationNeeded(level) => {
                self.clarify(request, session_id, session, &decision, level).await
            }
            RouterStatus::NoMatch => {
                session.clear_routing_state();
                self.clarify(request, session_id, session, &decision, ClarificationLevel::L4)
                    .await
            }
        }
    }

    fn apply_low_confidence_tracking(&self, decision: &RouteDecision, session: &mut Session) {
        if decision.confidence_level == ConfidenceLevel::Low {
            if session.increment_low_confidence() {
                session.clear_routing_state();
            }
        }
    }

    async fn clarify(
        &self,
        request: &QueryRequest,
        session_id: &str,
        session: &mut Session,
        decision: &RouteDecision,
        level: ClarificationLevel,
    ) -> QueryResponse {
        let outcome = self
            .option_generator
            .generate(
                level,
                decision.target_collection.as_deref(),
                decision.target_doc_id.as_deref(),
                &decision.all_scores,
                &request.query,
            )
            .await;

        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                warn!("option generation failed: {e}");
                ClarificationOutcome::NoInfoAvailable
            }
        };

        match outcome {
            ClarificationOutcome::Clarify(state) => {
                session.set_pending_clarification(state.clone());
                clarification_envelope(state, session_id)
            }
            ClarificationOutcome::NoInfoAvailable | ClarificationOutcome::AnswerReady => {
                answer_envelope(NO_INFO_FOUND, session_id, Vec::new())
            }
        }
    }

    async fn answer_for_decision(
        &self,
        request: &QueryRequest,
        session_id: &str,
        session: &mut Session,
        decision: &RouteDecision,
    ) -> QueryResponse {
        let Some(collection_id) = decision.target_collection.clone() else {
            return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new());
        };

        let query_embedding = match self.embedder.embed(&request.query).await {
            Ok(e) => e,
            Err(_) => return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new()),
        };

        let k = request.top_k.unwrap_or(self.config.broad_search_k);

        // A clarification resolution pins filters to the chosen document;
        // honor that over whatever the router inferred for this turn.
        let filters = request
            .pinned_filters
            .clone()
            .unwrap_or_else(|| decision.inferred_filters.clone());

        let mut candidates = match self.vector_index.search(
            &collection_id,
            &query_embedding,
            k,
            &filters,
        ) {
            Ok(c) => c,
            Err(_) => return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new()),
        };

        // A filter that matched nothing is retried once unfiltered before
        // giving up, rather than failing the whole turn.
        if candidates.is_empty() && !filters.is_effectively_empty() {
            warn!(%collection_id, "filtered search returned no candidates, retrying unfiltered");
            candidates = self
                .vector_index
                .search(&collection_id, &query_embedding, k, &Filters::default())
                .unwrap_or_default();
        }

        if candidates.is_empty() {
            return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new());
        }

        let reranked = if self.config.use_reranker {
            self.reranker
                .rerank(&request.query, candidates)
                .await
                .unwrap_or_default()
        } else {
            candidates
        };

        let Some(nucleus) = reranked.into_iter().next() else {
            return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new());
        };

        let document = match self
            .corpus
            .get_document(&nucleus.chunk.collection_id, &nucleus.chunk.doc_id)
        {
            Ok(d) => d,
            Err(_) => return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new()),
        };

        let history_tokens_estimate = session
            .history
            .iter()
            .map(|t| t.content.len() / 4)
            .sum::<usize>();
        let budget = self
            .config
            .n_ctx
            .saturating_sub(history_tokens_estimate)
            .saturating_sub(crate::context::SAFETY_BUFFER_TOKENS);

        if budget == 0 {
            return answer_envelope(APOLOGY_TOO_LARGE, session_id, Vec::new());
        }

        let assembled = match ContextAssembler::new().assemble(
            document,
            &nucleus.chunk,
            &request.query,
            budget,
        ) {
            Ok(a) => a,
            Err(RetrievalError::PromptTooLarge { .. }) => {
                return answer_envelope(APOLOGY_TOO_LARGE, session_id, Vec::new())
            }
            Err(_) => return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new()),
        };

        let prompt = build_prompt(&session.history, &assembled.text, &request.query);
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);
        let temperature = request.temperature.unwrap_or(self.config.temperature);

        let deadline = Duration::from_secs(self.config.turn_deadline_seconds);
        let generation = tokio::time::timeout(deadline, self.generator.generate(&prompt, max_tokens, temperature)).await;

        let (answer_text, incomplete) = match generation {
            Ok(Ok(text)) => (text, false),
            Ok(Err(RetrievalError::GeneratorTimeout)) | Err(_) => {
                (APOLOGY_NO_INFO.to_string(), true)
            }
            Ok(Err(e)) => {
                warn!("generator failed: {e}");
                (APOLOGY_NO_INFO.to_string(), true)
            }
        };

        let attachments = forms::detect_forms(&[document], self.url_builder.as_ref());
        let final_answer = forms::augment_answer_with_forms(&answer_text, &attachments);

        let context_info = ContextInfo {
            source_documents: vec![document.doc_id.clone()],
            source_collections: vec![document.collection_id.clone()],
        };
        let routing_info = RoutingInfo {
            confidence: decision.confidence,
            original_confidence: decision.original_confidence,
            was_overridden: decision.was_overridden,
            target_collection: decision.target_collection.clone(),
            inferred_filters: FiltersDto::from(&filters),
        };

        if !incomplete && decision.confidence >= self.config.min_context_confidence {
            session.record_success(
                document.collection_id.clone(),
                Some(document.doc_id.clone()),
                decision.confidence,
                filters,
            );
            session.push_history("assistant", &final_answer);
        }

        QueryResponse::Answer {
            answer: final_answer,
            context_info,
            form_attachments: attachments,
            routing_info,
            session_id: session_id.to_string(),
            processing_time: 0.0,
            incomplete,
        }
    }

    /// `USE_ROUTING=false` fallback: flat unfiltered search across every
    /// collection, picking the single best-scoring candidate overall.
    async fn flat_search_answer(
        &self,
        request: &QueryRequest,
        session_id: &str,
        _session: &mut Session,
    ) -> QueryResponse {
        let query_embedding = match self.embedder.embed(&request.query).await {
            Ok(e) => e,
            Err(_) => return answer_envelope(APOLOGY_NOT_READY, session_id, Vec::new()),
        };

        let mut best: Option<(String, crate::retrieval::ScoredChunk)> = None;
        for collection in self.corpus.list_collections() {
            if let Ok(mut results) = self.vector_index.search(
                &collection.id,
                &query_embedding,
                1,
                &Filters::default(),
            ) {
                if let Some(top) = results.drain(..).next() {
                    if best.as_ref().map(|(_, b)| top.score > b.score).unwrap_or(true) {
                        best = Some((collection.id.clone(), top));
                    }
                }
            }
        }

        let Some((_, nucleus)) = best else {
            return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new());
        };

        let document = match self
            .corpus
            .get_document(&nucleus.chunk.collection_id, &nucleus.chunk.doc_id)
        {
            Ok(d) => d,
            Err(_) => return answer_envelope(APOLOGY_NO_INFO, session_id, Vec::new()),
        };

        let assembled = match ContextAssembler::new().assemble(
            document,
            &nucleus.chunk,
            &request.query,
            self.config.n_ctx.saturating_sub(crate::context::SAFETY_BUFFER_TOKENS),
        ) {
            Ok(a) => a,
            Err(_) => return answer_envelope(APOLOGY_TOO_LARGE, session_id, Vec::new()),
        };

        let prompt = build_prompt(&[], &assembled.text, &request.query);
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);
        let temperature = request.temperature.unwrap_or(self.config.temperature);
        let answer_text = self
            .generator
            .generate(&prompt, max_tokens, temperature)
            .await
            .unwrap_or_else(|_| APOLOGY_NO_INFO.to_string());

        let attachments = forms::detect_forms(&[document], self.url_builder.as_ref());
        let final_answer = forms::augment_answer_with_forms(&answer_text, &attachments);

        answer_envelope(&final_answer, session_id, attachments)
    }

    /// Clears a session's pending clarification and resolves the
    /// user-selected option back into the next query to route.
    pub async fn resolve_clarification(
        &self,
        response: ClarificationResponse,
    ) -> Option<QueryRequest> {
        let session_lock = self.sessions.get_or_create(&response.session_id);
        let mut session = session_lock.write().await;
        let state = session.consume_pending_clarification()?;
        let option = state
            .offered_options
            .into_iter()
            .find(|o| o.id == response.selected_option_id)?;

        // An L2 question or L3 document choice pins retrieval to that
        // document; a collection-level or manual choice pins nothing.
        let pinned_filters = match option.action {
            ClarificationOptionAction::ShowDocumentQuestions
            | ClarificationOptionAction::ProceedWithDocument => {
                match (&option.collection, &option.document) {
                    (Some(collection_id), Some(doc_id)) => self
                        .corpus
                        .get_document(collection_id, doc_id)
                        .ok()
                        .map(router::filters_pinned_to_document),
                    _ => None,
                }
            }
            ClarificationOptionAction::ProceedWithCollection
            | ClarificationOptionAction::ManualInput => None,
        };

        let query = match option.action {
            ClarificationOptionAction::ShowDocumentQuestions => option.title,
            ClarificationOptionAction::ProceedWithDocument
            | ClarificationOptionAction::ProceedWithCollection => {
                response.original_question.unwrap_or(option.title)
            }
            ClarificationOptionAction::ManualInput => response.original_question.unwrap_or_default(),
        };

        Some(QueryRequest {
            query,
            session_id: Some(response.session_id),
            pinned_filters,
            max_tokens: None,
            temperature: None,
            top_k: None,
        })
    }
}

fn is_false(b: &bool) -> bool {
    !b
}

fn current_machine_state(session: &Session) -> MachineState {
    match &session.pending_clarification {
        None => MachineState::Idle,
        Some(state) => match state.level {
            ClarificationLevel::L1 => MachineState::L1Collection,
            ClarificationLevel::L2 => MachineState::L2DocumentQuestions,
            ClarificationLevel::L3 => MachineState::L3DocumentChoice,
            ClarificationLevel::L4 => MachineState::L4CollectionChoice,
        },
    }
}

fn answer_envelope(text: &str, session_id: &str, attachments: Vec<forms::FormAttachment>) -> QueryResponse {
    QueryResponse::Answer {
        answer: text.to_string(),
        context_info: ContextInfo::default(),
        form_attachments: attachments,
        routing_info: RoutingInfo {
            confidence: 0.0,
            original_confidence: 0.0,
            was_overridden: false,
            target_collection: None,
            inferred_filters: FiltersDto::default(),
        },
        session_id: session_id.to_string(),
        processing_time: 0.0,
        incomplete: false,
    }
}

fn clarification_message(level: ClarificationLevel) -> &'static str {
    match level {
        ClarificationLevel::L1 => "Bạn đang hỏi về thủ tục thuộc lĩnh vực nào?",
        ClarificationLevel::L2 => "Bạn muốn hỏi câu nào trong số này?",
        ClarificationLevel::L3 => "Bạn đang hỏi về thủ tục nào trong các thủ tục sau?",
        ClarificationLevel::L4 => "Bạn đang quan tâm đến lĩnh vực nào?",
    }
}

fn clarification_envelope(state: ClarificationState, session_id: &str) -> QueryResponse {
    let level = state.level;
    QueryResponse::ClarificationNeeded {
        clarification: ClarificationPayload {
            message: clarification_message(level).to_string(),
            options: state.offered_options,
            level,
        },
        session_id: session_id.to_string(),
        processing_time: 0.0,
    }
}

fn stamp_processing_time(response: QueryResponse, elapsed_secs: f64) -> QueryResponse {
    match response {
        QueryResponse::Answer {
            answer,
            context_info,
            form_attachments,
            routing_info,
            session_id,
            incomplete,
            ..
        } => QueryResponse::Answer {
            answer,
            context_info,
            form_attachments,
            routing_info,
            session_id,
            processing_time: elapsed_secs,
            incomplete,
        },
        QueryResponse::ClarificationNeeded {
            clarification,
            session_id,
            ..
        } => QueryResponse::ClarificationNeeded {
            clarification,
            session_id,
            processing_time: elapsed_secs,
        },
    }
}
