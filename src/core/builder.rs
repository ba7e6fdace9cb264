//! 编排器构建器：显式注册 worker，装配模型句柄、历史、解析器、Planner、Executor 与恢复策略

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::orchestrator::llm_factory_from_config;
use crate::core::{Orchestrator, RecoveryEngine};
use crate::llm::{LlmClient, LlmFactory, ModelHandle};
use crate::memory::{HistorySelector, HistoryStore};
use crate::plan::{Executor, Planner, ProgressSink};
use crate::resolver::{HistoryReferenceResolver, ReferenceResolver};
use crate::workers::{GeneralWorker, Worker, WorkerDispatcher, WorkerRegistry};

pub struct OrchestratorBuilder {
    config: AppConfig,
    registry: WorkerRegistry,
    llm: Option<Arc<dyn LlmClient>>,
    factory: Option<LlmFactory>,
    history: Option<Arc<HistoryStore>>,
    resolver: Option<Arc<dyn ReferenceResolver>>,
    sink: Option<Arc<dyn ProgressSink>>,
    general_worker: bool,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: WorkerRegistry::new(),
            llm: None,
            factory: None,
            history: None,
            resolver: None,
            sink: None,
            general_worker: false,
        }
    }

    pub fn register(mut self, worker: impl Worker + 'static) -> Self {
        self.registry.register(worker);
        self
    }

    pub fn register_arc(mut self, worker: Arc<dyn Worker>) -> Self {
        self.registry.register_arc(worker);
        self
    }

    /// 固定的 LLM 客户端（refresh 不会替换它）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 可刷新的 LLM：连接错误后用工厂重建
    pub fn with_llm_factory(mut self, factory: LlmFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 注册模型驱动的通用 worker（名称取 [workers].general，已注册同名 worker 时跳过）
    pub fn with_general_worker(mut self) -> Self {
        self.general_worker = true;
        self
    }

    pub fn build(self) -> Orchestrator {
        let Self {
            config,
            mut registry,
            llm,
            factory,
            history,
            resolver,
            sink,
            general_worker,
        } = self;

        let model = match (llm, factory) {
            (Some(llm), _) => ModelHandle::new(llm),
            (None, Some(factory)) => ModelHandle::with_factory(factory),
            (None, None) => ModelHandle::with_factory(llm_factory_from_config(&config)),
        };
        let model = Arc::new(model.with_retry(config.llm.retry_config()));

        if general_worker && !registry.contains(&config.workers.general) {
            registry.register(GeneralWorker::new(config.workers.general.clone(), model.clone()));
        }
        let registry = Arc::new(registry);
        tracing::info!(workers = ?registry.names(), "orchestrator workers registered");

        let history = history.unwrap_or_default();
        let resolver: Arc<dyn ReferenceResolver> = match resolver {
            Some(resolver) => resolver,
            None => Arc::new(HistoryReferenceResolver::new(history.clone())),
        };

        let dispatcher = Arc::new(WorkerDispatcher::new(
            registry.clone(),
            config.workers.browser.clone(),
        ));
        let recovery = Arc::new(RecoveryEngine::new(
            dispatcher.clone(),
            model.clone(),
            config.workers.clone(),
            config.recovery.rate_limit_delay(),
        ));

        let selector = config.planner.enable_conversation_history.then(|| {
            HistorySelector::new(
                config.planner.max_conversation_tokens,
                config.planner.response_reserve_tokens,
            )
        });
        let planner = Planner::new(model.clone(), registry.clone(), config.workers.general.clone())
            .with_history(selector);
        let executor = Executor::new(dispatcher, recovery, history.clone());

        Orchestrator {
            config,
            registry,
            model,
            history,
            resolver,
            planner,
            executor,
            sink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::workers::{EchoWorker, WorkerKind};

    #[test]
    fn test_general_worker_registered_once() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::default()))
            .register(EchoWorker::new("echo_agent"))
            .with_general_worker()
            .build();
        let workers = orch.list_workers();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[1].name, "generic_agent");
        assert_eq!(workers[1].kind, WorkerKind::Module);
        assert!(workers[1].capabilities.features.streaming);
    }

    #[test]
    fn test_existing_general_worker_kept() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::default()))
            .register(EchoWorker::new("generic_agent"))
            .with_general_worker()
            .build();
        let workers = orch.list_workers();
        assert_eq!(workers.len(), 1);
        assert!(!workers[0].capabilities.features.streaming);
    }
}
