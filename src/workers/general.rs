//! 通用对话 worker（generic_agent）：直接让模型回答
//!
//! 阻塞入口在 spawn_blocking 线程中经 Handle::block_on 调用模型；流式入口把模型的 Token 流转成分片。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

use crate::llm::ModelHandle;
use crate::memory::Message;
use crate::workers::{
    Capabilities, ChunkStream, StepResult, StreamChunk, Worker, WorkerError, WorkerFeatures,
};

const SYSTEM_PROMPT: &str = "You are a helpful general-purpose assistant. Answer the user's request \
directly and concisely. If earlier results are provided, use them.";

pub struct GeneralWorker {
    name: String,
    model: Arc<ModelHandle>,
}

impl GeneralWorker {
    pub fn new(name: impl Into<String>, model: Arc<ModelHandle>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    fn build_messages(query: &str, context: &Value) -> Vec<Message> {
        let mut messages = vec![Message::system(SYSTEM_PROMPT)];
        if let Some(previous) = context
            .get("latest_result")
            .and_then(|r| r.get("answer"))
            .and_then(Value::as_str)
        {
            messages.push(Message::system(format!("Earlier result:\n{previous}")));
        }
        messages.push(Message::user(query));
        messages
    }
}

#[async_trait]
impl Worker for GeneralWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new("General-purpose conversational assistant for questions without a dedicated module")
            .with_capabilities([
                "Answer general questions",
                "Hold a conversation",
                "Summarize or rewrite text",
            ])
            .with_examples(["hello, how are you", "explain what a mutex is"])
            .with_features(WorkerFeatures {
                streaming: true,
                ..WorkerFeatures::default()
            })
    }

    fn process(&self, query: &str, context: &Value) -> Result<StepResult, WorkerError> {
        let messages = Self::build_messages(query, context);
        let answer = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkerError::Failed(e.to_string()))?
            .block_on(self.model.complete(&messages))
            .map_err(WorkerError::Failed)?;
        Ok(StepResult::success(
            "Response generated",
            json!({ "answer": answer, "content": answer }),
        ))
    }

    async fn stream_process(&self, query: &str, context: &Value) -> Result<ChunkStream, WorkerError> {
        let messages = Self::build_messages(query, context);
        let tokens = self
            .model
            .client()
            .complete_stream(&messages)
            .await
            .map_err(WorkerError::Failed)?;

        let chunks = tokens.map(|token| match token {
            Ok(text) => StreamChunk::chunk(text),
            Err(e) => StreamChunk::error(e),
        });
        // 末尾补一个空内容的 complete：派发器用累积内容作为最终结果
        Ok(Box::pin(chunks.chain(stream::iter([StreamChunk::complete("")]))))
    }
}
