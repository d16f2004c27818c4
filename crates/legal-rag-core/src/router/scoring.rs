//! Cue-set detection, title boosting, and confidence banding.
//!
//! Fixed cue phrases plus a token-length check, scored and clamped by
//! small pure functions rather than inline at the call site.

use crate::router::ConfidenceLevel;

/// Fixed cue set for follow-up detection.
pub const FOLLOWUP_CUES: [&str; 10] = [
    "ủa", "vậy", "thế", "còn", "bao nhiêu", "phí", "tiền", "chi phí", "lệ phí", "khi nào",
];

pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.80;
pub const MEDIUM_HIGH_THRESHOLD: f32 = 0.65;
pub const MIN_CONFIDENCE_THRESHOLD: f32 = 0.50;
pub const VERY_HIGH_CONFIDENCE_GATE: f32 = 0.82;
pub const MIN_CONTEXT_CONFIDENCE: f32 = 0.78;
pub const FOLLOWUP_CONFIDENCE: f32 = 0.85;
pub const OVERRIDE_CONFIDENCE_FLOOR: f32 = 0.85;
const FOLLOWUP_MAX_TOKENS: usize = 6;

/// A query of at most 6 tokens, or containing one of the fixed cue phrases,
/// is treated as a follow-up to the session's prior successful collection.
pub fn is_followup_query(query: &str) -> bool {
    let token_count = query.split_whitespace().count();
    if token_count <= FOLLOWUP_MAX_TOKENS {
        return true;
    }
    let lower = query.to_lowercase();
    FOLLOWUP_CUES.iter().any(|cue| lower.contains(cue))
}

/// +0.3 for a core procedure whose title matches the query, +0.1 otherwise;
/// zero when the title doesn't appear in either direction.
pub fn title_boost(document_title: &str, query: &str, is_core_procedure: bool) -> f32 {
    let title_lower = document_title.to_lowercase();
    let query_lower = query.to_lowercase();
    let matches = query_lower.contains(&title_lower) || title_lower.contains(&query_lower);
    if !matches {
        return 0.0;
    }
    if is_core_procedure {
        0.3
    } else {
        0.1
    }
}

/// Pure confidence-to-band mapping, kept as a single function rather than
/// scattering threshold checks across call sites.
pub fn confidence_level(confidence: f32) -> ConfidenceLevel {
    if confidence >= HIGH_CONFIDENCE_THRESHOLD {
        ConfidenceLevel::High
    } else if confidence >= MEDIUM_HIGH_THRESHOLD {
        ConfidenceLevel::MediumHigh
    } else if confidence >= MIN_CONFIDENCE_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Whether the stateful override fires for the given current confidence
/// `c` and prior successful confidence `p`.
pub fn override_fires(c: f32, p: Option<f32>) -> bool {
    match p {
        Some(p) => c < VERY_HIGH_CONFIDENCE_GATE && p >= MIN_CONTEXT_CONFIDENCE,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_query_is_a_followup() {
        assert!(is_followup_query("có tốn phí không"));
    }

    #[test]
    fn long_query_without_cue_is_not_a_followup() {
        assert!(!is_followup_query(
            "thủ tục đăng ký khai sinh cho trẻ em sinh ra ở nước ngoài cần những giấy tờ gì theo quy định hiện hành"
        ));
    }

    #[test]
    fn long_query_with_cue_is_a_followup() {
        assert!(is_followup_query(
            "vậy còn thủ tục đăng ký khai sinh cho trẻ em sinh ra ở nước ngoài thì lệ phí tính như thế nào"
        ));
    }

    #[test]
    fn core_procedure_title_match_gets_large_boost() {
        let boost = title_boost("Đăng ký khai sinh", "thủ tục đăng ký khai sinh cần gì", true);
        assert_eq!(boost, 0.3);
    }

    #[test]
    fn non_core_procedure_title_match_gets_small_boost() {
        let boost = title_boost("Đăng ký khai sinh ở nước ngoài", "đăng ký khai sinh ở nước ngoài", false);
        assert_eq!(boost, 0.1);
    }

    #[test]
    fn no_title_match_gets_no_boost() {
        assert_eq!(title_boost("Đăng ký kết hôn", "thủ tục ly hôn", true), 0.0);
    }

    #[test]
    fn banding_matches_fixed_thresholds() {
        assert_eq!(confidence_level(0.95), ConfidenceLevel::High);
        assert_eq!(confidence_level(0.80), ConfidenceLevel::High);
        assert_eq!(confidence_level(0.70), ConfidenceLevel::MediumHigh);
        assert_eq!(confidence_level(0.55), ConfidenceLevel::Medium);
        assert_eq!(confidence_level(0.10), ConfidenceLevel::Low);
    }

    #[test]
    fn override_requires_both_bounds() {
        assert!(override_fires(0.70, Some(0.80)));
        assert!(!override_fires(0.90, Some(0.80)));
        assert!(!override_fires(0.70, Some(0.60)));
        assert!(!override_fires(0.70, None));
    }
}
