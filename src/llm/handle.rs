//! 模型句柄：持有当前 LLM 客户端，支持显式 refresh 与原子替换
//!
//! 多个查询并发使用同一句柄；refresh 只替换 RwLock 里的 Arc，正在进行中的调用
//! 仍持有旧客户端的 Arc 直到结束。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::HiveError;
use crate::llm::{LlmClient, RetryConfig};
use crate::memory::Message;

/// 重建客户端的工厂（refresh 时调用）
pub type LlmFactory = Arc<dyn Fn() -> Arc<dyn LlmClient> + Send + Sync>;

pub struct ModelHandle {
    current: RwLock<Arc<dyn LlmClient>>,
    factory: Option<LlmFactory>,
    retry: RetryConfig,
    /// 每次成功 refresh 递增
    generation: AtomicU64,
}

impl ModelHandle {
    /// 固定客户端（无法 refresh）
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            current: RwLock::new(client),
            factory: None,
            retry: RetryConfig::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// 由工厂创建初始客户端，refresh 时用同一工厂重建
    pub fn with_factory(factory: LlmFactory) -> Self {
        let client = factory();
        Self {
            current: RwLock::new(client),
            factory: Some(factory),
            retry: RetryConfig::default(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 当前客户端
    pub fn client(&self) -> Arc<dyn LlmClient> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// 重建并替换客户端；没有工厂时保持原客户端并返回 false
    pub fn refresh(&self) -> bool {
        let Some(factory) = &self.factory else {
            tracing::warn!("No LLM factory configured, keeping current client");
            return false;
        };
        let fresh = factory();
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(generation, "LLM client refreshed");
        true
    }

    /// 单次调用，不重试
    pub async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.client().complete(messages).await
    }

    /// 连接类错误：refresh + 固定退避后重试（最多 max_attempts 次）；其它错误立即返回
    pub async fn complete_with_retry(&self, messages: &[Message]) -> Result<String, HiveError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client().complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if self.retry.is_transient(&e) => {
                    tracing::warn!(attempt, attempts, error = %e, "LLM connection error");
                    last_error = e;
                    self.refresh();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(e) => return Err(HiveError::Llm(e)),
            }
        }

        Err(HiveError::Llm(format!(
            "Connection error: all retries to LLM failed ({last_error})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retry_after_connection_error() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err("Connection refused".to_string()),
            Ok("{}".to_string()),
        ]));
        let shared = client.clone();
        let handle = ModelHandle::with_factory(Arc::new(move || shared.clone() as Arc<dyn LlmClient>))
            .with_retry(fast_retry());

        let out = handle.complete_with_retry(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "{}");
        assert_eq!(client.calls(), 2);
        assert_eq!(handle.generation(), 1);
    }

    #[tokio::test]
    async fn test_non_transient_error_propagates_immediately() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err("invalid api key".to_string()),
            Ok("never".to_string()),
        ]));
        let handle = ModelHandle::new(client.clone()).with_retry(fast_retry());

        let err = handle.complete_with_retry(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, HiveError::Llm("invalid api key".into()));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err("timeout".to_string()),
            Err("timeout".to_string()),
        ]));
        let handle = ModelHandle::new(client.clone()).with_retry(fast_retry());

        let err = handle.complete_with_retry(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("all retries to LLM failed"));
        assert_eq!(client.calls(), 2);
        // 无工厂：refresh 不生效
        assert_eq!(handle.generation(), 0);
    }
}
