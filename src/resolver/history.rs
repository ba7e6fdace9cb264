//! 基于消息历史的默认解析器
//!
//! 识别两类引用：显式占位符 `[<worker> data]` / `[<worker> results]`（保持原样），
//! 以及自然短语（"previous message"、"last response" 等，改写为 `[previous_message data]`）。
//! 都绑定到该用户最近一条 agent 消息；占位符点名 worker 时优先取该 worker 的输出。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::memory::{HistoryStore, ReferencedContent};
use crate::resolver::{ReferenceResolver, Resolution};

pub const PREVIOUS_MESSAGE: &str = "previous_message";

const PHRASES: &[&str] = &[
    "the previous message",
    "previous message",
    "your last response",
    "your last answer",
    "your last message",
    "the last response",
    "last response",
    "the previous response",
    "previous response",
    "what you just said",
    "what you just told me",
    "the previous result",
];

fn placeholder_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([A-Za-z0-9_]+) (?:data|results?)\]").ok())
        .as_ref()
}

fn phrase_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = PHRASES
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok()
    })
    .as_ref()
}

pub struct HistoryReferenceResolver {
    store: Arc<HistoryStore>,
}

impl HistoryReferenceResolver {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }

    fn bind(&self, user_id: &str, worker: Option<&str>) -> Option<(String, String)> {
        let record = worker
            .and_then(|w| self.store.last_agent_message(user_id, Some(w)))
            .or_else(|| self.store.last_agent_message(user_id, None))?;
        let source = worker
            .map(String::from)
            .or_else(|| record.source_worker().map(String::from))
            .unwrap_or_else(|| PREVIOUS_MESSAGE.to_string());
        Some((record.content, source))
    }
}

#[async_trait]
impl ReferenceResolver for HistoryReferenceResolver {
    async fn resolve(&self, query: &str, user_id: &str) -> Result<Resolution, String> {
        if let Some(caps) = placeholder_pattern().and_then(|re| re.captures(query)) {
            let placeholder = caps.get(0).map(|m| m.as_str().to_string());
            let named = caps
                .get(1)
                .map(|m| m.as_str())
                .filter(|w| *w != PREVIOUS_MESSAGE);
            if let Some((content, source_worker)) = self.bind(user_id, named) {
                tracing::debug!(source = %source_worker, "bound placeholder to history");
                return Ok(Resolution {
                    query: query.to_string(),
                    was_modified: true,
                    reference: Some(ReferencedContent {
                        content,
                        source_worker,
                        placeholder,
                    }),
                });
            }
            return Ok(Resolution::unchanged(query));
        }

        let Some(re) = phrase_pattern() else {
            return Ok(Resolution::unchanged(query));
        };
        if !re.is_match(query) {
            return Ok(Resolution::unchanged(query));
        }
        let Some((content, source_worker)) = self.bind(user_id, None) else {
            return Ok(Resolution::unchanged(query));
        };

        let placeholder = format!("[{PREVIOUS_MESSAGE} data]");
        let rewritten = re.replace_all(query, placeholder.as_str()).into_owned();
        Ok(Resolution {
            query: rewritten,
            was_modified: true,
            reference: Some(ReferencedContent {
                content,
                source_worker,
                placeholder: Some(placeholder),
            }),
        })
    }
}
