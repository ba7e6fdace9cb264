//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use crate::memory::Message;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>, String>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 累计 token 使用 (prompt, completion, total)；不统计的后端返回 0
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 连接类错误的重试策略：命中 transient_markers 时刷新客户端并退避后重试
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数（首次 + 重试）
    pub max_attempts: usize,
    /// 两次尝试之间的固定退避
    pub backoff: Duration,
    /// 错误文本（小写）包含其中任一子串即视为瞬时连接错误
    pub transient_markers: Vec<String>,
}

impl RetryConfig {
    pub fn is_transient(&self, error: &str) -> bool {
        let lower = error.to_lowercase();
        self.transient_markers
            .iter()
            .any(|m| lower.contains(m.as_str()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(1500),
            transient_markers: default_transient_markers(),
        }
    }
}

pub fn default_transient_markers() -> Vec<String> {
    ["connection", "timeout", "connecterror", "pooltimeout"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient() {
        let cfg = RetryConfig::default();
        assert!(cfg.is_transient("Connection reset by peer"));
        assert!(cfg.is_transient("request TIMEOUT after 30s"));
        assert!(!cfg.is_transient("invalid api key"));
    }
}
