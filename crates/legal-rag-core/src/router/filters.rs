//! Conversion between a `RouterQuestion`'s `SmartFilters` and the vector
//! index's `Filters`, plus the exact-title pin used when the clarification
//! engine narrows to a single document.

use crate::corpus::{Document, SmartFilters};
use crate::retrieval::Filters;

pub fn filters_from_smart_filters(smart: &SmartFilters) -> Filters {
    Filters {
        exact_title: smart.exact_title.clone(),
        doc_id: smart.doc_id.clone(),
        agency: smart.agency.clone(),
    }
}

/// Pins retrieval to `document`'s exact title and id, the way a selected
/// L2 question carries the candidate document's filter forward into the
/// next query.
pub fn filters_pinned_to_document(document: &Document) -> Filters {
    Filters {
        exact_title: vec![document.title.clone()],
        doc_id: vec![document.doc_id.clone()],
        agency: Vec::new(),
    }
}
