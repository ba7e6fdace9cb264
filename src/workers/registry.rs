//! Worker 注册表
//!
//! 所有模块/集成实现 Worker trait（name / capabilities / process），由 WorkerRegistry 按名注册与查找。
//! 可选能力（流式、非阻塞入口、嵌套查询）通过 capabilities().features 显式声明，派发时按标志选择模式。

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::workers::{StepResult, StreamChunk};

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// 模块（自然语言查询）或集成（命令）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    Module,
    Integration,
}

/// 可选能力标志
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFeatures {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub non_blocking: bool,
    #[serde(default)]
    pub nested_queries: bool,
}

/// 能力描述（只用于生成规划 prompt 与 list_workers）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub example_queries: Vec<String>,
    #[serde(default)]
    pub features: WorkerFeatures,
}

impl Capabilities {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_capabilities<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_examples<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.example_queries = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_features(mut self, features: WorkerFeatures) -> Self {
        self.features = features;
        self
    }
}

/// worker 入口抛出的错误；派发处统一转为 StepResult{error}
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),

    #[error("{0} is not supported by this worker")]
    Unsupported(&'static str),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Worker trait：阻塞入口 process 必须实现；process_async / stream_process 按 features 声明可选实现
#[async_trait]
pub trait Worker: Send + Sync {
    /// 唯一名称（计划中的 "module" / "integration" 字段）
    fn name(&self) -> &str;

    fn kind(&self) -> WorkerKind {
        WorkerKind::Module
    }

    fn capabilities(&self) -> Capabilities;

    /// 阻塞入口；派发器在 spawn_blocking 中调用。context 为 Context::worker_view()
    fn process(&self, query: &str, context: &Value) -> Result<StepResult, WorkerError>;

    /// 非阻塞入口（features.non_blocking）
    async fn process_async(&self, _query: &str, _context: &Value) -> Result<StepResult, WorkerError> {
        Err(WorkerError::Unsupported("process_async"))
    }

    /// 流式入口（features.streaming）；遇到 stream_complete / stream_error 即终止
    async fn stream_process(&self, _query: &str, _context: &Value) -> Result<ChunkStream, WorkerError> {
        Err(WorkerError::Unsupported("stream_process"))
    }
}

/// list_workers 的单项
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub kind: WorkerKind,
    pub name: String,
    pub capabilities: Capabilities,
}

/// 注册表：保持注册顺序（"第一个已注册 worker" 的兜底依赖它）
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Vec<Arc<dyn Worker>>,
    index: HashMap<String, usize>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: impl Worker + 'static) {
        self.register_arc(Arc::new(worker));
    }

    /// 同名再次注册时原位替换
    pub fn register_arc(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        match self.index.get(&name) {
            Some(&i) => {
                tracing::warn!(worker = %name, "worker re-registered, replacing previous instance");
                self.workers[i] = worker;
            }
            None => {
                self.index.insert(name, self.workers.len());
                self.workers.push(worker);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.index.get(name).map(|&i| self.workers[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 注册顺序中的第一个
    pub fn first(&self) -> Option<Arc<dyn Worker>> {
        self.workers.first().cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn of_kind(&self, kind: WorkerKind) -> impl Iterator<Item = &Arc<dyn Worker>> {
        self.workers.iter().filter(move |w| w.kind() == kind)
    }

    /// 全部 worker 的能力清单（模块在前、集成在后）
    pub fn catalogue(&self) -> Vec<WorkerSummary> {
        [WorkerKind::Module, WorkerKind::Integration]
            .into_iter()
            .flat_map(|kind| {
                self.of_kind(kind).map(move |w| WorkerSummary {
                    kind,
                    name: w.name().to_string(),
                    capabilities: w.capabilities(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::EchoWorker;

    struct Hook;

    impl Worker for Hook {
        fn name(&self) -> &str {
            "slack"
        }
        fn kind(&self) -> WorkerKind {
            WorkerKind::Integration
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::new("Post to a channel")
        }
        fn process(&self, query: &str, _context: &Value) -> Result<StepResult, WorkerError> {
            Ok(StepResult::success("posted", serde_json::json!({ "answer": query })))
        }
    }

    #[test]
    fn test_registration_order_and_lookup() {
        let mut reg = WorkerRegistry::new();
        reg.register(Hook);
        reg.register(EchoWorker::new("x"));
        assert_eq!(reg.names(), vec!["slack", "x"]);
        assert_eq!(reg.first().unwrap().name(), "slack");
        assert!(reg.contains("x"));
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let mut reg = WorkerRegistry::new();
        reg.register(EchoWorker::new("a"));
        reg.register(EchoWorker::new("b"));
        reg.register(EchoWorker::new("a"));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_catalogue_lists_modules_before_integrations() {
        let mut reg = WorkerRegistry::new();
        reg.register(Hook);
        reg.register(EchoWorker::new("echo_agent"));
        let cat = reg.catalogue();
        assert_eq!(cat[0].name, "echo_agent");
        assert_eq!(cat[0].kind, WorkerKind::Module);
        assert_eq!(cat[1].kind, WorkerKind::Integration);
    }
}
