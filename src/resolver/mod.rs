//! 历史引用解析
//!
//! 编排器只在查询含有指示词（previous、last、方括号等）时才调用解析器；
//! 解析器返回可能改写过的查询与被引用的内容，由编排器写入 Context。

pub mod history;

use async_trait::async_trait;

use crate::memory::ReferencedContent;

pub use history::HistoryReferenceResolver;

/// 触发解析的指示词（小写子串）
pub const INDICATORS: &[&str] = &[
    "previous", "last", "earlier", "before", "just said", "just told", "response", "answer",
    "result", "that", "send it", "send this", "use it", "use what", "[", "]",
];

/// 廉价预过滤：不含任何指示词时跳过解析
pub fn needs_resolution(query: &str) -> bool {
    let lower = query.to_lowercase();
    INDICATORS.iter().any(|i| lower.contains(i))
}

/// 解析结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub query: String,
    pub was_modified: bool,
    pub reference: Option<ReferencedContent>,
}

impl Resolution {
    pub fn unchanged(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            was_modified: false,
            reference: None,
        }
    }
}

#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve(&self, query: &str, user_id: &str) -> Result<Resolution, String>;
}
