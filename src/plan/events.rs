//! 进度事件：规划、步骤开始/完成、流式分片与错误指引，推送给调用方提供的 ProgressSink
//!
//! 推送失败只记日志，从不影响步骤执行。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::workers::StepResult;

/// 单条进度事件；序列化为 {"type": ..., "status": ..., ...字段}
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Planning {
        message: String,
    },
    PlanReady {
        plan: Vec<String>,
        thought_process: String,
    },
    ModuleStart {
        step: usize,
        total_steps: usize,
        module: String,
        message: String,
    },
    ModuleComplete {
        step: usize,
        total_steps: usize,
        module: String,
        result: StepResult,
    },
    IntegrationStart {
        step: usize,
        total_steps: usize,
        integration: String,
        message: String,
    },
    IntegrationComplete {
        step: usize,
        total_steps: usize,
        integration: String,
        result: StepResult,
    },
    /// 流式分片
    Stream {
        module: String,
        content: String,
        metadata: Map<String, Value>,
    },
    /// 流式结束；metadata 为最终 data
    StreamComplete {
        module: String,
        content: String,
        metadata: Value,
    },
    ErrorGuidance {
        module: String,
        message: String,
    },
    Error {
        module: String,
        message: String,
    },
}

impl ProgressEvent {
    /// 外层 type：stream / stream_complete / progress
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Stream { .. } => "stream",
            ProgressEvent::StreamComplete { .. } => "stream_complete",
            _ => "progress",
        }
    }

    /// 带 type 字段的 JSON
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(obj) = &mut value {
            obj.insert("type".into(), Value::String(self.kind().into()));
        }
        value
    }
}

/// 进度接收方（由嵌入方提供）
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), String>;
}

#[async_trait]
impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), String> {
        self.send(event).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    async fn deliver(&self, event: ProgressEvent) -> Result<(), String> {
        self.send(event).await.map_err(|e| e.to_string())
    }
}

/// 推送事件；没有 sink 时静默，失败只记 warn
pub async fn emit(sink: Option<&dyn ProgressSink>, event: ProgressEvent) {
    let Some(sink) = sink else {
        return;
    };
    let kind = event.kind();
    if let Err(e) = sink.deliver(event).await {
        tracing::warn!(kind, error = %e, "failed to deliver progress event");
    }
}
