//! Generator contract (external LLM collaborator).
//!
//! The LLM runtime itself is out of scope: this module only defines the
//! textual I/O contract the orchestrator calls across — a single
//! chat-formatted string in, plain text out — plus one HTTP-backed
//! implementation using `reqwest::Client` with a request timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{RetrievalError, Result};
use crate::session::HistoryTurn;

pub const DOCUMENT_START: &str = "<<<DOCUMENT_START>>>";
pub const DOCUMENT_END: &str = "<<<DOCUMENT_END>>>";

pub const SYSTEM_PROMPT: &str = "Bạn là trợ lý tra cứu thủ tục hành chính. \
Chỉ trả lời dựa trên nội dung nằm giữa các thẻ đánh dấu nucleus; trả lời trong 5-7 câu, \
không dùng ký tự trang trí; nếu tài liệu có mẫu đơn (has_form=true), thêm một dòng nhắc về mẫu đơn đính kèm; \
với câu hỏi về lệ phí, phải phân biệt rõ lệ phí thủ tục cốt lõi với phí sao y, bản sao.";

/// Builds the single chat-formatted input string: system prompt, bounded
/// history, user content wrapped in document sentinels, and an open
/// assistant tag.
pub fn build_prompt(history: &[HistoryTurn], document_content: &str, user_query: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("<|system|>\n");
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push('\n');
    for turn in history {
        prompt.push_str(&format!("<|{}|>\n{}\n", turn.role, turn.content));
    }
    prompt.push_str("<|user|>\n");
    prompt.push_str(DOCUMENT_START);
    prompt.push('\n');
    prompt.push_str(document_content);
    prompt.push('\n');
    prompt.push_str(DOCUMENT_END);
    prompt.push('\n');
    prompt.push_str(user_query);
    prompt.push('\n');
    prompt.push_str("<|assistant|>\n");
    prompt
}

/// Strips leftover ChatML-like role tags from a raw generation.
pub fn strip_chat_tags(raw: &str) -> String {
    lazy_static::lazy_static! {
        static ref TAG_RE: regex::Regex = regex::Regex::new(r"<\|[a-zA-Z_]+\|>").unwrap();
    }
    TAG_RE.replace_all(raw, "").trim().to_string()
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

pub struct HttpGenerator {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let response = self
            .client
            .post(self.completions_url())
            .json(&CompletionRequest {
                prompt,
                max_tokens,
                temperature,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::GeneratorTimeout
                } else {
                    RetrievalError::Other(anyhow::anyhow!("generator request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::Other(anyhow::anyhow!(
                "generator backend returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Other(anyhow::anyhow!("invalid generator response: {e}")))?;

        let raw = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .unwrap_or_default();
        Ok(strip_chat_tags(&raw))
    }
}
