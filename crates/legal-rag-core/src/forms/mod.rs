//! Form detector (component H): attaches downloadable form files when a
//! contributing document declares `has_form`.

use serde::{Deserialize, Serialize};

use crate::corpus::Document;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormAttachment {
    pub document_id: String,
    pub document_title: String,
    pub form_filename: String,
    pub form_url: String,
    pub collection_id: String,
}

/// URL builder for the form-serving collaborator; the core only produces
/// identifiers and filenames, the collaborator owns URL construction.
pub trait FormUrlBuilder: Send + Sync {
    fn build_url(&self, collection_id: &str, doc_id: &str, filename: &str) -> String;
}

pub struct PathFormUrlBuilder {
    pub base_path: String,
}

impl FormUrlBuilder for PathFormUrlBuilder {
    fn build_url(&self, collection_id: &str, doc_id: &str, filename: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_path.trim_end_matches('/'),
            collection_id,
            doc_id,
            filename
        )
    }
}

/// Emits a `FormAttachment` per form file on every contributing document
/// with `has_form=true`.
pub fn detect_forms(
    contributing_documents: &[&Document],
    url_builder: &dyn FormUrlBuilder,
) -> Vec<FormAttachment> {
    contributing_documents
        .iter()
        .filter(|doc| doc.metadata.has_form)
        .flat_map(|doc| {
            doc.metadata.form_filenames.iter().map(move |filename| FormAttachment {
                document_id: doc.doc_id.clone(),
                document_title: doc.title.clone(),
                form_filename: filename.clone(),
                form_url: url_builder.build_url(&doc.collection_id, &doc.doc_id, filename),
                collection_id: doc.collection_id.clone(),
            })
        })
        .collect()
}

/// Appends a trailing line referencing attached forms when at least one
/// attachment exists; leaves the answer untouched otherwise.
pub fn augment_answer_with_forms(answer: &str, attachments: &[FormAttachment]) -> String {
    if attachments.is_empty() {
        return answer.to_string();
    }
    let names: Vec<&str> = attachments.iter().map(|a| a.form_filename.as_str()).collect();
    format!("{answer}\n\nMẫu đơn đính kèm: {}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::DocumentMetadata;

    fn doc_with_form() -> Document {
        Document {
            collection_id: "c1".into(),
            doc_id: "d1".into(),
            title: "Đăng ký khai sinh".into(),
            metadata: DocumentMetadata {
                has_form: true,
                form_filenames: vec!["to-khai.pdf".to_string()],
                ..Default::default()
            },
            chunks: vec![],
        }
    }

    fn doc_without_form() -> Document {
        Document {
            collection_id: "c1".into(),
            doc_id: "d2".into(),
            title: "Đăng ký kết hôn".into(),
            metadata: DocumentMetadata::default(),
            chunks: vec![],
        }
    }

    struct FakeUrlBuilder;
    impl FormUrlBuilder for FakeUrlBuilder {
        fn build_url(&self, collection_id: &str, doc_id: &str, filename: &str) -> String {
            format!("https://forms.example/{collection_id}/{doc_id}/{filename}")
        }
    }

    #[test]
    fn attachments_are_non_empty_iff_a_document_has_form() {
        let with_form = doc_with_form();
        let attachments = detect_forms(&[&with_form], &FakeUrlBuilder);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].document_title, "Đăng ký khai sinh");

        let without_form = doc_without_form();
        let none = detect_forms(&[&without_form], &FakeUrlBuilder);
        assert!(none.is_empty());
    }

    #[test]
    fn answer_is_unchanged_without_attachments() {
        let answer = augment_answer_with_forms("Trả lời.", &[]);
        assert_eq!(answer, "Trả lời.");
    }

    #[test]
    fn answer_gets_trailing_form_reference_line() {
        let with_form = doc_with_form();
        let attachments = detect_forms(&[&with_form], &FakeUrlBuilder);
        let answer = augment_answer_with_forms("Trả lời.", &attachments);
        assert!(answer.contains("to-khai.pdf"));
    }
}
