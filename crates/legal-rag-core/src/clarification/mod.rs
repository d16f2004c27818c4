//! Clarification engine (component D): a state machine over a session,
//! driven by router confidence, expressed as pure transition functions
//! `(state, router_decision) -> state'` rather than threshold checks
//! scattered across call sites. Option generation lives in `options.rs`.

pub mod options;

pub use options::{ClarificationOption, ClarificationOptionAction, OptionGenerator};

use serde::{Deserialize, Serialize};

use crate::router::{RouteDecision, RouterStatus};

/// L1 is reachable only as a fallback transition, never entered directly
/// from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClarificationLevel {
    L1,
    L2,
    L3,
    L4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Idle,
    L1Collection,
    L2DocumentQuestions,
    L3DocumentChoice,
    L4CollectionChoice,
    AnswerReady,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationState {
    pub level: ClarificationLevel,
    pub candidate_collection: Option<String>,
    pub candidate_doc_id: Option<String>,
    pub offered_options: Vec<ClarificationOption>,
    pub original_query: String,
}

impl ClarificationState {
    pub fn new(
        level: ClarificationLevel,
        candidate_collection: Option<String>,
        candidate_doc_id: Option<String>,
        offered_options: Vec<ClarificationOption>,
        original_query: impl Into<String>,
    ) -> Self {
        Self {
            level,
            candidate_collection,
            candidate_doc_id,
            offered_options,
            original_query: original_query.into(),
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self::new(ClarificationLevel::L2, None, None, Vec::new(), "test query")
    }
}

/// The decision the orchestrator acts on for this turn.
#[derive(Debug, Clone)]
pub enum ClarificationOutcome {
    /// Proceed to generation with the router's routed target.
    AnswerReady,
    /// Present `state` to the user; no generation this turn.
    Clarify(ClarificationState),
    /// Nothing useful could be offered even at the broadest level.
    NoInfoAvailable,
}

/// Pure transition function: given the machine's current state and this
/// turn's router decision, returns the next machine state. Does not, by
/// itself, generate options — the orchestrator calls `OptionGenerator`
/// separately and folds the result into a `ClarificationState`.
pub fn transition(current: MachineState, route: &RouteDecision) -> MachineState {
    match route.status {
        RouterStatus::Routed => MachineState::AnswerReady,
        RouterStatus::NoMatch => MachineState::Idle,
        RouterStatus::ClarificationNeeded(level) => match (current, level) {
            (MachineState::L3DocumentChoice, ClarificationLevel::L2) => {
                MachineState::L2DocumentQuestions
            }
            (MachineState::L4CollectionChoice, ClarificationLevel::L3) => {
                MachineState::L3DocumentChoice
            }
            (_, ClarificationLevel::L2) => MachineState::L2DocumentQuestions,
            (_, ClarificationLevel::L3) => MachineState::L3DocumentChoice,
            (_, ClarificationLevel::L4) => MachineState::L4CollectionChoice,
            (_, ClarificationLevel::L1) => MachineState::L1Collection,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ConfidenceLevel;
    use crate::retrieval::Filters;

    fn route_with(status: RouterStatus) -> RouteDecision {
        RouteDecision {
            status,
            confidence_level: ConfidenceLevel::Low,
            target_collection: None,
            target_doc_id: None,
            confidence: 0.0,
            original_confidence: 0.0,
            was_overridden: false,
            inferred_filters: Filters::default(),
            matched_example: None,
            source_procedure: None,
            all_scores: Vec::new(),
        }
    }

    #[test]
    fn idle_goes_to_answer_ready_on_routed() {
        let next = transition(MachineState::Idle, &route_with(RouterStatus::Routed));
        assert_eq!(next, MachineState::AnswerReady);
    }

    #[test]
    fn idle_goes_to_l4_on_low_confidence() {
        let next = transition(
            MachineState::Idle,
            &route_with(RouterStatus::ClarificationNeeded(ClarificationLevel::L4)),
        );
        assert_eq!(next, MachineState::L4CollectionChoice);
    }

    #[test]
    fn l4_moves_to_l3_when_user_picks_a_collection() {
        let next = transition(
            MachineState::L4CollectionChoice,
            &route_with(RouterStatus::ClarificationNeeded(ClarificationLevel::L3)),
        );
        assert_eq!(next, MachineState::L3DocumentChoice);
    }

    #[test]
    fn l3_moves_to_l2_when_user_picks_a_document() {
        let next = transition(
            MachineState::L3DocumentChoice,
            &route_with(RouterStatus::ClarificationNeeded(ClarificationLevel::L2)),
        );
        assert_eq!(next, MachineState::L2DocumentQuestions);
    }

    #[test]
    fn any_level_returns_to_idle_on_no_match() {
        let next = transition(MachineState::L2DocumentQuestions, &route_with(RouterStatus::NoMatch));
        assert_eq!(next, MachineState::Idle);
    }
}
