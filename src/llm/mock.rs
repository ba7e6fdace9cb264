//! Mock LLM 客户端（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：规划请求时把最后一条用户消息路由给通用 worker；其它请求回显。
//! - ScriptedLlmClient：按顺序返回预设结果，并记录收到的请求。

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, Stream};

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Mock 客户端：规划请求返回单步计划，其它请求回显用户最后一条消息
#[derive(Debug)]
pub struct MockLlmClient {
    general_worker: String,
}

impl MockLlmClient {
    pub fn new(general_worker: impl Into<String>) -> Self {
        Self {
            general_worker: general_worker.into(),
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("generic_agent")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let is_planning = messages
            .first()
            .map(|m| m.role == Role::System && m.content.contains("module_calls"))
            .unwrap_or(false);

        if is_planning {
            Ok(serde_json::json!({
                "thought_process": "Mock planner routes every query to the general worker",
                "plan": ["Answer the query"],
                "module_calls": [{
                    "module": self.general_worker,
                    "query": last_user,
                    "reason": "Offline mock planning"
                }]
            })
            .to_string())
        } else {
            Ok(format!("Echo from Mock: {last_user}"))
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>, String> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 脚本客户端：依次弹出预设结果；用尽后返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 便捷构造：全部为成功回复
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 收到过的全部请求（按调用顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>, String> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
