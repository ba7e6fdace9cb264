//! Worker 派发器
//!
//! 按 worker 声明的 features 选择执行模式：流式（需调用方开启且有 sink）、非阻塞入口（仅指定的浏览器 worker）、
//! 否则在 spawn_blocking 中调用阻塞入口。worker 返回的 Err 与 panic 都在这里转为 StepResult{error}；
//! 每次调用输出结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt};
use serde_json::{json, Value};

use crate::core::HiveError;
use crate::memory::Context;
use crate::plan::{emit, ProgressEvent, ProgressSink};
use crate::workers::{identity, ChunkKind, StepResult, Worker, WorkerError, WorkerRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Streaming,
    NonBlocking,
    Offloaded,
}

impl DispatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchMode::Streaming => "streaming",
            DispatchMode::NonBlocking => "non_blocking",
            DispatchMode::Offloaded => "offloaded",
        }
    }
}

pub struct WorkerDispatcher {
    registry: Arc<WorkerRegistry>,
    /// 唯一允许走非阻塞入口的 worker
    browser_worker: String,
}

impl WorkerDispatcher {
    pub fn new(registry: Arc<WorkerRegistry>, browser_worker: impl Into<String>) -> Self {
        Self {
            registry,
            browser_worker: browser_worker.into(),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn mode_for(&self, worker: &dyn Worker, streaming_enabled: bool, has_sink: bool) -> DispatchMode {
        let features = worker.capabilities().features;
        if features.streaming && streaming_enabled && has_sink {
            DispatchMode::Streaming
        } else if features.non_blocking && worker.name() == self.browser_worker {
            DispatchMode::NonBlocking
        } else {
            DispatchMode::Offloaded
        }
    }

    /// 执行一次调用；永不失败，所有错误都落为 StepResult{error}
    pub async fn dispatch(
        &self,
        worker_name: &str,
        input: &str,
        context: &Context,
        sink: Option<&dyn ProgressSink>,
    ) -> StepResult {
        let Some(worker) = self.registry.get(worker_name) else {
            return not_found(worker_name);
        };

        let mode = self.mode_for(worker.as_ref(), context.streaming_enabled(), sink.is_some());
        let view = context.worker_view();
        let start = Instant::now();

        let result = match mode {
            DispatchMode::Streaming => {
                AssertUnwindSafe(run_streaming(worker.as_ref(), input, &view, sink))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| panicked(worker_name, panic))
            }
            DispatchMode::NonBlocking => {
                match AssertUnwindSafe(worker.process_async(input, &view))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => into_step_result(worker_name, outcome),
                    Err(panic) => panicked(worker_name, panic),
                }
            }
            DispatchMode::Offloaded => {
                run_offloaded(worker.clone(), input.to_string(), view, context.user_id().to_string()).await
            }
        }
        .with_worker(worker_name);

        let audit = json!({
            "event": "worker_audit",
            "worker": worker_name,
            "mode": mode.as_str(),
            "ok": result.is_success(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": input_preview(input),
        });
        tracing::info!(audit = %audit.to_string(), "worker");

        result
    }
}

/// 未注册的 worker
pub fn not_found(worker_name: &str) -> StepResult {
    StepResult::error(HiveError::WorkerNotFound(worker_name.to_string()).to_string())
        .with_data(json!({ "error_type": "module_not_found" }))
        .with_worker(worker_name)
}

async fn run_offloaded(worker: Arc<dyn Worker>, input: String, view: Value, user_id: String) -> StepResult {
    let name = worker.name().to_string();
    let joined = tokio::task::spawn_blocking(move || {
        identity::scope(&user_id, || worker.process(&input, &view))
    })
    .await;

    match joined {
        Ok(outcome) => into_step_result(&name, outcome),
        Err(e) if e.is_panic() => panicked(&name, e.into_panic()),
        Err(e) => into_step_result(&name, Err(WorkerError::Failed(e.to_string()))),
    }
}

async fn run_streaming(
    worker: &dyn Worker,
    input: &str,
    view: &Value,
    sink: Option<&dyn ProgressSink>,
) -> StepResult {
    let name = worker.name();
    let mut stream = match worker.stream_process(input, view).await {
        Ok(stream) => stream,
        Err(e) => return StepResult::error(format!("Streaming error: {e}")),
    };

    let mut content = String::new();
    let mut metadata = serde_json::Map::new();
    while let Some(chunk) = stream.next().await {
        match chunk.kind {
            ChunkKind::Chunk => {
                content.push_str(&chunk.content);
                emit(
                    sink,
                    ProgressEvent::Stream {
                        module: name.to_string(),
                        content: chunk.content,
                        metadata: chunk.metadata,
                    },
                )
                .await;
            }
            ChunkKind::Complete => {
                if !chunk.content.is_empty() {
                    content = chunk.content;
                }
                metadata = chunk.metadata;
                break;
            }
            ChunkKind::Error => {
                tracing::error!(worker = name, error = %chunk.content, "streaming error");
                let message = if chunk.content.is_empty() {
                    "Streaming error occurred".to_string()
                } else {
                    chunk.content
                };
                return StepResult::error(message);
            }
        }
    }

    let mut data = json!({
        "content": content,
        "answer": content,
        "streamed": true,
    });
    if let Value::Object(obj) = &mut data {
        obj.extend(metadata);
    }

    emit(
        sink,
        ProgressEvent::StreamComplete {
            module: name.to_string(),
            content: content.clone(),
            metadata: data.clone(),
        },
    )
    .await;

    StepResult::success("Content generated successfully via streaming", data)
}

fn into_step_result(worker_name: &str, outcome: Result<StepResult, WorkerError>) -> StepResult {
    match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(worker = worker_name, error = %e, "worker raised");
            let message = e.to_string();
            StepResult::error(
                HiveError::WorkerExecution {
                    worker: worker_name.to_string(),
                    message: message.clone(),
                }
                .to_string(),
            )
            .with_data(json!({ "error": message }))
        }
    }
}

fn panicked(worker_name: &str, panic: Box<dyn Any + Send>) -> StepResult {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(worker = worker_name, panic = %message, "worker panicked");
    into_step_result(worker_name, Err(WorkerError::Panicked(message)))
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}
