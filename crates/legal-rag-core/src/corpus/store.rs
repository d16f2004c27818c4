//! On-disk corpus store: `collections/<id>/{metadata.json, documents/<doc_id>/{content.json,
//! forms/*}, router_data/questions.json}` plus `registry/{collections.json, documents.json}`.
//!
//! Loaded once at startup and held behind an `Arc`; this crate never
//! mutates a corpus at serving time — rebuilding is the job of offline
//! tooling that runs separately from the serving path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::corpus::schema::{
    Collection, CollectionStatus, Document, DocumentMetadata, RouterQuestion,
    RouterQuestionStatus, RouterQuestionType, SmartFilters,
};
use crate::errors::{RetrievalError, Result};

#[derive(Debug, serde::Deserialize)]
struct ContentJson {
    title: String,
    #[serde(default)]
    metadata: ContentMetadataJson,
    #[serde(default)]
    chunks: Vec<ChunkJson>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ContentMetadataJson {
    issuing_agency: Option<String>,
    executing_agency: Option<String>,
    fee_text: Option<String>,
    fee_vnd: Option<f64>,
    processing_time: Option<String>,
    #[serde(default)]
    has_form: bool,
    #[serde(default)]
    form_filenames: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ChunkJson {
    chunk_index: usize,
    content: String,
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, serde::Deserialize)]
struct QuestionsJson {
    #[serde(default)]
    questions: Vec<QuestionJson>,
}

#[derive(Debug, serde::Deserialize)]
struct QuestionJson {
    id: String,
    text: String,
    doc_id: String,
    #[serde(default)]
    question_type: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    smart_filters: SmartFiltersJson,
    #[serde(default)]
    priority_score: f32,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct SmartFiltersJson {
    #[serde(default)]
    exact_title: Vec<String>,
    #[serde(default)]
    doc_id: Vec<String>,
    #[serde(default)]
    agency: Vec<String>,
}

pub struct CorpusStore {
    root: PathBuf,
    collections: HashMap<String, Collection>,
    /// collection_id -> doc_id -> Document
    documents: HashMap<String, HashMap<String, Document>>,
    /// collection_id -> RouterQuestions (active + deleted, for audit)
    questions: HashMap<String, Vec<RouterQuestion>>,
}

impl CorpusStore {
    /// Load the entire corpus from `root` eagerly. Corrupt JSON is fatal
    /// at startup rather than surfacing mid-query.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let collections_dir = root.join("collections");

        let mut collections = HashMap::new();
        let mut documents = HashMap::new();
        let mut questions = HashMap::new();

        let entries = std::fs::read_dir(&collections_dir).map_err(|e| {
            RetrievalError::CorpusCorrupt(format!(
                "cannot read collections dir {}: {e}",
                collections_dir.display()
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                RetrievalError::CorpusCorrupt(format!("cannot read collection entry: {e}"))
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let collection_id = entry.file_name().to_string_lossy().to_string();
            let collection_dir = entry.path();

            let docs = Self::load_documents(&collection_id, &collection_dir)?;
            let qs = Self::load_questions(&collection_id, &collection_dir)?;

            let status = if docs.is_empty() {
                CollectionStatus::Empty
            } else {
                CollectionStatus::Active
            };

            collections.insert(
                collection_id.clone(),
                Collection {
                    id: collection_id.clone(),
                    display_name: collection_id.replace('_', " "),
                    document_count: docs.len(),
                    last_updated: chrono::Utc::now(),
                    status,
                },
            );
            documents.insert(collection_id.clone(), docs);
            questions.insert(collection_id, qs);
        }

        Ok(Self {
            root,
            collections,
            documents,
            questions,
        })
    }

    fn load_documents(
        collection_id: &str,
        collection_dir: &Path,
    ) -> Result<HashMap<String, Document>> {
        let mut out = HashMap::new();
        let documents_dir = collection_dir.join("documents");
        if !documents_dir.is_dir() {
            return Ok(out);
        }

        for entry in std::fs::read_dir(&documents_dir).map_err(|e| {
            RetrievalError::CorpusCorrupt(format!("cannot read documents dir: {e}"))
        })? {
            let entry = entry
                .map_err(|e| RetrievalError::CorpusCorrupt(format!("bad document entry: {e}")))?;
            if !entry.path().is_dir() {
                continue;
            }
            let doc_id = entry.file_name().to_string_lossy().to_string();
            let content_path = entry.path().join("content.json");
            let raw = std::fs::read_to_string(&content_path).map_err(|e| {
                RetrievalError::CorpusCorrupt(format!(
                    "cannot read {}: {e}",
                    content_path.display()
                ))
            })?;
            let parsed: ContentJson = serde_json::from_str(&raw).map_err(|e| {
                RetrievalError::CorpusCorrupt(format!(
                    "invalid json in {}: {e}",
                    content_path.display()
                ))
            })?;

            let chunks = parsed
                .chunks
                .into_iter()
                .map(|c| crate::corpus::schema::Chunk {
                    collection_id: collection_id.to_string(),
                    doc_id: doc_id.clone(),
                    chunk_index: c.chunk_index,
                    source_path: content_path.display().to_string(),
                    content: c.content,
                    embedding: c.embedding,
                })
                .collect();

            let metadata = DocumentMetadata {
                issuing_agency: parsed.metadata.issuing_agency,
                executing_agency: parsed.metadata.executing_agency,
                fee_text: parsed.metadata.fee_text,
                fee_vnd: parsed.metadata.fee_vnd,
                processing_time: parsed.metadata.processing_time,
                has_form: parsed.metadata.has_form,
                form_filenames: parsed.metadata.form_filenames,
            };

            out.insert(
                doc_id.clone(),
                Document {
                    collection_id: collection_id.to_string(),
                    doc_id,
                    title: parsed.title,
                    metadata,
                    chunks,
                },
            );
        }
        Ok(out)
    }

    /// Reads `router_data/questions.json`, falling back to the legacy
    /// `router_data/router_questions.json` name. Both are normalized into
    /// the same `RouterQuestion` shape; the source format is logged so a
    /// lingering legacy file is visible in telemetry.
    fn load_questions(collection_id: &str, collection_dir: &Path) -> Result<Vec<RouterQuestion>> {
        let router_dir = collection_dir.join("router_data");
        let current = router_dir.join("questions.json");
        let legacy = router_dir.join("router_questions.json");

        let (path, format_tag) = if current.is_file() {
            (current, "current")
        } else if legacy.is_file() {
            (legacy, "legacy")
        } else {
            return Ok(Vec::new());
        };

        debug!(
            collection_id,
            format = format_tag,
            path = %path.display(),
            "loaded router questions"
        );

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            RetrievalError::CorpusCorrupt(format!("cannot read {}: {e}", path.display()))
        })?;
        let parsed: QuestionsJson = serde_json::from_str(&raw).map_err(|e| {
            RetrievalError::CorpusCorrupt(format!("invalid json in {}: {e}", path.display()))
        })?;

        Ok(parsed
            .questions
            .into_iter()
            .map(|q| RouterQuestion {
                id: q.id,
                text: q.text,
                collection_id: collection_id.to_string(),
                doc_id: q.doc_id,
                question_type: match q.question_type.as_deref() {
                    Some("variant") => RouterQuestionType::Variant,
                    _ => RouterQuestionType::Main,
                },
                keywords: q.keywords,
                smart_filters: SmartFilters {
                    exact_title: q.smart_filters.exact_title,
                    doc_id: q.smart_filters.doc_id,
                    agency: q.smart_filters.agency,
                },
                priority_score: q.priority_score,
                status: match q.status.as_deref() {
                    Some("deleted") => RouterQuestionStatus::Deleted,
                    _ => RouterQuestionStatus::Active,
                },
                embedding: q.embedding,
            })
            .collect())
    }

    pub fn list_collections(&self) -> Vec<&Collection> {
        self.collections.values().collect()
    }

    pub fn list_documents(&self, collection_id: &str) -> Vec<&Document> {
        self.documents
            .get(collection_id)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn get_document(&self, collection_id: &str, doc_id: &str) -> Result<&Document> {
        self.documents
            .get(collection_id)
            .and_then(|m| m.get(doc_id))
            .ok_or_else(|| RetrievalError::NotFound {
                collection_id: collection_id.to_string(),
                doc_id: doc_id.to_string(),
            })
    }

    pub fn router_questions(&self, collection_id: &str) -> &[RouterQuestion] {
        self.questions
            .get(collection_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_router_questions(&self) -> impl Iterator<Item = &RouterQuestion> {
        self.questions.values().flatten()
    }

    /// Resolves a form file's absolute path given `(collection_id, doc_id)`
    /// and a filename declared in the document's metadata. Returns `None`
    /// if the file isn't declared or doesn't exist on disk.
    pub fn resolve_form_path(
        &self,
        collection_id: &str,
        doc_id: &str,
        filename: &str,
    ) -> Option<PathBuf> {
        let doc = self.documents.get(collection_id)?.get(doc_id)?;
        if !doc.metadata.form_filenames.iter().any(|f| f == filename) {
            warn!(collection_id, doc_id, filename, "form file not declared in metadata");
            return None;
        }
        let path = self
            .root
            .join("collections")
            .join(collection_id)
            .join("documents")
            .join(doc_id)
            .join("forms")
            .join(filename);
        path.is_file().then_some(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
