//! Corpus store (component A): on-disk, collection-first layout of
//! procedure documents, router-question bundles and forms.

pub mod schema;
pub mod store;

pub use schema::{
    Chunk, Collection, CollectionStatus, Document, DocumentMetadata, RouterQuestion,
    RouterQuestionStatus, RouterQuestionType, SmartFilters, EMBEDDING_DIM,
};
pub use store::CorpusStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_collection(
        root: &std::path::Path,
        collection_id: &str,
        doc_id: &str,
        title: &str,
        has_form: bool,
    ) {
        let doc_dir = root
            .join("collections")
            .join(collection_id)
            .join("documents")
            .join(doc_id);
        fs::create_dir_all(&doc_dir).unwrap();
        let content = serde_json::json!({
            "title": title,
            "metadata": {
                "issuing_agency": "UBND xã",
                "fee_text": "Miễn lệ phí",
                "fee_vnd": 0.0,
                "processing_time": "ngay trong ngày",
                "has_form": has_form,
                "form_filenames": if has_form { vec!["mau-don.docx"] } else { vec![] },
            },
            "chunks": [
                {"chunk_index": 0, "content": "Nội dung đoạn 1", "embedding": [0.1, 0.2]},
                {"chunk_index": 1, "content": "Nội dung đoạn 2", "embedding": [0.2, 0.1]},
            ]
        });
        fs::write(doc_dir.join("content.json"), content.to_string()).unwrap();

        if has_form {
            let forms_dir = doc_dir.join("forms");
            fs::create_dir_all(&forms_dir).unwrap();
            fs::write(forms_dir.join("mau-don.docx"), b"stub").unwrap();
        }

        let router_dir = root.join("collections").join(collection_id).join("router_data");
        fs::create_dir_all(&router_dir).unwrap();
        let questions = serde_json::json!({
            "questions": [
                {
                    "id": format!("{doc_id}-q1"),
                    "text": format!("{title} cần giấy tờ gì?"),
                    "doc_id": doc_id,
                    "question_type": "main",
                    "keywords": [],
                    "smart_filters": {"exact_title": [title]},
                    "priority_score": 1.0,
                    "status": "active",
                }
            ]
        });
        fs::write(router_dir.join("questions.json"), questions.to_string()).unwrap();
    }

    #[test]
    fn loads_documents_and_questions() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "quy_trinh_cap_ho_tich_cap_xa", "dang-ky-khai-sinh", "Đăng ký khai sinh", true);

        let store = CorpusStore::load(tmp.path()).unwrap();
        let docs = store.list_documents("quy_trinh_cap_ho_tich_cap_xa");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Đăng ký khai sinh");
        assert!(docs[0].metadata.has_form);

        let questions = store.router_questions("quy_trinh_cap_ho_tich_cap_xa");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].doc_id, "dang-ky-khai-sinh");
    }

    #[test]
    fn missing_document_is_not_found() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "c1", "d1", "Title", false);
        let store = CorpusStore::load(tmp.path()).unwrap();
        let err = store.get_document("c1", "does-not-exist").unwrap_err();
        assert!(matches!(err, crate::errors::RetrievalError::NotFound { .. }));
    }

    #[test]
    fn full_text_concatenates_chunks_in_order() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "c1", "d1", "Title", false);
        let store = CorpusStore::load(tmp.path()).unwrap();
        let doc = store.get_document("c1", "d1").unwrap();
        let text = doc.full_text();
        assert!(text.find("đoạn 1").unwrap() < text.find("đoạn 2").unwrap());
    }

    #[test]
    fn resolve_form_path_requires_declared_filename() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "c1", "d1", "Title", true);
        let store = CorpusStore::load(tmp.path()).unwrap();
        assert!(store.resolve_form_path("c1", "d1", "mau-don.docx").is_some());
        assert!(store.resolve_form_path("c1", "d1", "not-declared.docx").is_none());
    }

    #[test]
    fn legacy_router_questions_filename_is_read() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "c1", "d1", "Title", false);
        // Remove the current-format file and replace it with the legacy name.
        let router_dir = tmp.path().join("collections").join("c1").join("router_data");
        let current = router_dir.join("questions.json");
        let raw = fs::read_to_string(&current).unwrap();
        fs::remove_file(&current).unwrap();
        fs::write(router_dir.join("router_questions.json"), raw).unwrap();

        let store = CorpusStore::load(tmp.path()).unwrap();
        assert_eq!(store.router_questions("c1").len(), 1);
    }

    #[test]
    fn corrupt_json_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let doc_dir = tmp.path().join("collections").join("c1").join("documents").join("d1");
        fs::create_dir_all(&doc_dir).unwrap();
        fs::write(doc_dir.join("content.json"), "{not valid json").unwrap();

        let err = CorpusStore::load(tmp.path()).unwrap_err();
        assert!(matches!(err, crate::errors::RetrievalError::CorpusCorrupt(_)));
    }
}
