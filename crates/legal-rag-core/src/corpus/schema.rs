//! Data model shared by the corpus store, router and vector index: plain
//! public-field structs with derive-based serde, no hand-written codecs.

use serde::{Deserialize, Serialize};

pub const EMBEDDING_DIM: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStatus {
    Active,
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub display_name: String,
    pub document_count: usize,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub status: CollectionStatus,
}

/// Document metadata as read from `documents/<doc_id>/content.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub issuing_agency: Option<String>,
    pub executing_agency: Option<String>,
    pub fee_text: Option<String>,
    pub fee_vnd: Option<f64>,
    pub processing_time: Option<String>,
    pub has_form: bool,
    pub form_filenames: Vec<String>,
}

impl DocumentMetadata {
    /// Plain `key: value` lines for recognized metadata keys, in a fixed
    /// order, skipping keys that are absent in the source.
    pub fn as_plain_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(agency) = &self.issuing_agency {
            lines.push(format!("Cơ quan ban hành: {agency}"));
        }
        if let Some(agency) = &self.executing_agency {
            lines.push(format!("Cơ quan thực hiện: {agency}"));
        }
        if let Some(fee) = &self.fee_text {
            lines.push(format!("Lệ phí: {fee}"));
        }
        if let Some(fee) = self.fee_vnd {
            lines.push(format!("Lệ phí (số): {fee}"));
        }
        if let Some(time) = &self.processing_time {
            lines.push(format!("Thời gian xử lý: {time}"));
        }
        lines.push(format!("Có mẫu đơn: {}", if self.has_form { "có" } else { "không" }));
        lines
    }

    /// True when the procedure's core fee is exempt (fee_vnd == 0 and the
    /// fee text contains a "miễn" keyword) but a copy surcharge remains.
    pub fn is_core_fee_exempt(&self) -> bool {
        let zero = matches!(self.fee_vnd, Some(v) if v == 0.0);
        let miễn = self
            .fee_text
            .as_deref()
            .map(|t| t.to_lowercase().contains("miễn"))
            .unwrap_or(false);
        zero && miễn
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub collection_id: String,
    pub doc_id: String,
    pub title: String,
    pub metadata: DocumentMetadata,
    pub chunks: Vec<Chunk>,
}

impl Document {
    /// Full text: concatenation of chunk contents in chunk_index order.
    pub fn full_text(&self) -> String {
        let mut ordered: Vec<&Chunk> = self.chunks.iter().collect();
        ordered.sort_by_key(|c| c.chunk_index);
        ordered
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// "Core procedure" titles carry no modifiers like "ở nước ngoài"
    /// (abroad), "lưu động" (mobile), "đăng ký lại" (re-registration).
    pub fn is_core_procedure(&self) -> bool {
        const MODIFIERS: [&str; 4] = ["ở nước ngoài", "lưu động", "đăng ký lại", "trực tuyến"];
        let lower = self.title.to_lowercase();
        !MODIFIERS.iter().any(|m| lower.contains(m))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub collection_id: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub source_path: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterQuestionType {
    Main,
    Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterQuestionStatus {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartFilters {
    pub exact_title: Vec<String>,
    pub doc_id: Vec<String>,
    pub agency: Vec<String>,
}

impl SmartFilters {
    pub fn is_effectively_empty(&self) -> bool {
        self.exact_title.is_empty() && self.doc_id.is_empty() && self.agency.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterQuestion {
    pub id: String,
    pub text: String,
    pub collection_id: String,
    pub doc_id: String,
    pub question_type: RouterQuestionType,
    pub keywords: Vec<String>,
    pub smart_filters: SmartFilters,
    pub priority_score: f32,
    pub status: RouterQuestionStatus,
    pub embedding: Option<Vec<f32>>,
}
