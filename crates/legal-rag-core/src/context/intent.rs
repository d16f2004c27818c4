//! Query intent classification. Each `Intent` variant builds its own
//! optional prelude string rather than a central function branching on a
//! string tag.

use crate::corpus::DocumentMetadata;

const FEE_CUES: [&str; 4] = ["phí", "tiền", "lệ phí", "chi phí"];
const PROCESSING_TIME_CUES: [&str; 3] = ["bao lâu", "thời gian", "khi nào xong"];
const AGENCY_CUES: [&str; 3] = ["cơ quan nào", "ở đâu", "nơi nào"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Fee,
    ProcessingTime,
    Agency,
    General,
}

impl Intent {
    /// Keyword classification with an explicit `General` default.
    pub fn classify(query: &str) -> Intent {
        let lower = query.to_lowercase();
        if FEE_CUES.iter().any(|c| lower.contains(c)) {
            Intent::Fee
        } else if PROCESSING_TIME_CUES.iter().any(|c| lower.contains(c)) {
            Intent::ProcessingTime
        } else if AGENCY_CUES.iter().any(|c| lower.contains(c)) {
            Intent::Agency
        } else {
            Intent::General
        }
    }

    /// Each variant's own prelude, or `None` when the metadata has nothing
    /// relevant to say.
    pub fn build_prelude(&self, metadata: &DocumentMetadata) -> Option<String> {
        match self {
            Intent::Fee => fee_prelude(metadata),
            Intent::ProcessingTime => metadata
                .processing_time
                .as_ref()
                .map(|t| format!("Thời gian xử lý: {t}")),
            Intent::Agency => metadata
                .issuing_agency
                .as_ref()
                .or(metadata.executing_agency.as_ref())
                .map(|a| format!("Cơ quan thực hiện: {a}")),
            Intent::General => None,
        }
    }
}

/// Fee prelude distinguishing the core procedural fee from ancillary copy
/// fees: a zero-fee core procedure with a "miễn" fee text still carries a
/// separate, non-exempt copy-extract surcharge.
fn fee_prelude(metadata: &DocumentMetadata) -> Option<String> {
    if metadata.is_core_fee_exempt() {
        let detail = metadata.fee_text.clone().unwrap_or_default();
        return Some(format!(
            "Lệ phí: Thủ tục này được miễn lệ phí. {detail}"
        ));
    }
    metadata.fee_text.as_ref().map(|t| format!("Lệ phí: {t}"))
}
