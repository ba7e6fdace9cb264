//! 编排器：process_query 的完整流程
//!
//! 校验输入 → 记录用户消息 → （含指示词时）解析历史引用并写入 Context → 规划 → 按序执行。
//! 同一个 Orchestrator 可以被多个查询并发使用；每个查询独占自己的 Context。

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::core::{HiveError, OrchestratorBuilder};
use crate::llm::{create_deepseek_client, LlmClient, LlmFactory, MockLlmClient, ModelHandle, OpenAiClient};
use crate::memory::{Context, HistoryStore, MessageRecord, MessageType};
use crate::plan::{emit, AggregatedResult, Executor, NestedQueryHandler, Planner, ProgressEvent, ProgressSink};
use crate::resolver::{needs_resolution, ReferenceResolver};
use crate::workers::{NestedQuery, WorkerRegistry, WorkerSummary};

/// 按配置与环境变量选择 LLM 后端：provider=mock 或没有任何 Key 时用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient::new(cfg.workers.general.clone()));
    }

    // 有 DeepSeek Key，或配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
    if has_deepseek_key && provider != "openai" || provider == "deepseek" && has_openai_key {
        let client = create_deepseek_client(cfg.llm.model.as_deref(), cfg.llm.base_url.as_deref());
        tracing::info!("Using DeepSeek LLM ({})", client.model_name());
        Arc::new(client)
    } else if has_openai_key {
        let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new(cfg.workers.general.clone()))
    }
}

/// refresh 时按同一配置重建客户端
pub fn llm_factory_from_config(cfg: &AppConfig) -> LlmFactory {
    let cfg = cfg.clone();
    Arc::new(move || create_llm_from_config(&cfg))
}

pub struct Orchestrator {
    pub(crate) config: AppConfig,
    pub(crate) registry: Arc<WorkerRegistry>,
    pub(crate) model: Arc<ModelHandle>,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) resolver: Arc<dyn ReferenceResolver>,
    pub(crate) planner: Planner,
    pub(crate) executor: Executor,
    pub(crate) sink: Option<Arc<dyn ProgressSink>>,
}

impl Orchestrator {
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// 已注册 worker 的类型、名称与能力（模块在前）
    pub fn list_workers(&self) -> Vec<WorkerSummary> {
        self.registry.catalogue()
    }

    /// 处理一条查询；使用构建时配置的进度 sink（后台查询不推送进度）
    pub async fn process_query(
        &self,
        query: impl Into<Value>,
        context: Option<Context>,
        is_background: bool,
    ) -> AggregatedResult {
        let sink = if is_background { None } else { self.sink.as_deref() };
        self.process_at_depth(query.into(), context, sink, 0).await
    }

    /// 同 process_query，但进度推送到调用方给出的 sink
    pub async fn process_query_with_progress(
        &self,
        query: impl Into<Value>,
        context: Option<Context>,
        sink: &dyn ProgressSink,
    ) -> AggregatedResult {
        self.process_at_depth(query.into(), context, Some(sink), 0).await
    }

    fn process_at_depth<'a>(
        &'a self,
        query: Value,
        seed: Option<Context>,
        sink: Option<&'a dyn ProgressSink>,
        depth: usize,
    ) -> BoxFuture<'a, AggregatedResult> {
        async move {
            let query = match query {
                Value::Null => {
                    tracing::error!("query is null in process_query call");
                    return AggregatedResult::failed(HiveError::InvalidInput(
                        "Query cannot be None".to_string(),
                    ));
                }
                Value::String(s) => s,
                other => {
                    tracing::warn!(query = %other, "query is not a string, converting");
                    other.to_string()
                }
            };

            let mut context =
                seed.unwrap_or_else(|| Context::new(self.config.app.default_user.clone()));
            if context.user_id().is_empty() {
                context.set_user_id(self.config.app.default_user.clone());
            }
            let user_id = context.user_id().to_string();
            tracing::info!(user = %user_id, depth, "processing query");

            self.history
                .append(MessageRecord::new(&user_id, &query, MessageType::User));

            let query = self.resolve_references(query, &user_id, &mut context).await;

            emit(
                sink,
                ProgressEvent::Planning {
                    message: "Planning task execution...".to_string(),
                },
            )
            .await;

            let plan = match self.planner.plan(&query, &context).await {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!(error = %e, "planning failed");
                    return AggregatedResult::failed(e);
                }
            };

            tracing::info!(steps = plan.invocations.len(), rationale = %plan.rationale, "plan ready");
            emit(
                sink,
                ProgressEvent::PlanReady {
                    plan: plan.steps.clone(),
                    thought_process: plan.rationale.clone(),
                },
            )
            .await;

            let nested = NestedRunner {
                orchestrator: self,
                sink,
                depth,
            };
            self.executor
                .execute(plan, context, sink, Some(&nested))
                .await
        }
        .boxed()
    }

    /// 仅在含指示词时调用解析器；失败只记日志并沿用原查询
    async fn resolve_references(&self, query: String, user_id: &str, context: &mut Context) -> String {
        if !needs_resolution(&query) {
            return query;
        }

        let resolution = match self.resolver.resolve(&query, user_id).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(error = %e, "reference resolution failed, using original query");
                return query;
            }
        };
        if !resolution.was_modified {
            return query;
        }

        if let Some(reference) = resolution.reference {
            tracing::info!(source = %reference.source_worker, "stored referenced content in context");
            context.attach_reference(reference);
        }
        if resolution.query != query {
            tracing::info!(original = %query, resolved = %resolution.query, "query resolved");
            self.history.append(
                MessageRecord::new(user_id, &resolution.query, MessageType::User).with_references(
                    json!({ "original_query": query, "was_resolved": true }),
                ),
            );
        }
        resolution.query
    }
}

/// 嵌套查询：同一用户、深度 +1；超过上限返回 NestingLimit；后台请求不推送进度
struct NestedRunner<'a> {
    orchestrator: &'a Orchestrator,
    sink: Option<&'a dyn ProgressSink>,
    depth: usize,
}

#[async_trait::async_trait]
impl NestedQueryHandler for NestedRunner<'_> {
    async fn run_nested(&self, request: NestedQuery, user_id: &str) -> AggregatedResult {
        let limit = self.orchestrator.config.workers.max_nested_depth;
        let depth = self.depth + 1;
        if depth > limit {
            tracing::warn!(depth, limit, "nested query depth limit reached");
            return AggregatedResult::failed(HiveError::NestingLimit(limit));
        }
        let sink = if request.is_background { None } else { self.sink };
        self.orchestrator
            .process_at_depth(
                Value::String(request.query),
                Some(Context::new(user_id)),
                sink,
                depth,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::workers::EchoWorker;

    fn orchestrator(replies: Vec<&str>) -> (Orchestrator, Arc<ScriptedLlmClient>) {
        let llm = Arc::new(ScriptedLlmClient::replies(replies));
        let orch = Orchestrator::builder(AppConfig::default())
            .with_llm(llm.clone())
            .register(EchoWorker::new("generic_agent"))
            .build();
        (orch, llm)
    }

    #[tokio::test]
    async fn test_null_query_rejected() {
        let (orch, llm) = orchestrator(vec![]);
        let r = orch.process_query(Value::Null, None, false).await;
        assert_eq!(r.error, Some(HiveError::InvalidInput("Query cannot be None".into())));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_string_query_coerced() {
        let (orch, llm) = orchestrator(vec![r#"{"module_calls":[]}"#]);
        let r = orch.process_query(json!(42), None, false).await;
        assert!(r.is_success());
        assert_eq!(r.results()[0].answer(), Some("42"));
        let transcript = &llm.requests()[0];
        assert_eq!(transcript.last().unwrap().content, "42");
    }

    #[tokio::test]
    async fn test_user_message_recorded_under_default_user() {
        let (orch, _) = orchestrator(vec![r#"{"module_calls":[]}"#]);
        orch.process_query("hi there", None, false).await;
        let msgs = orch.history().messages("default_user");
        assert_eq!(msgs[0].message_type, MessageType::User);
        assert_eq!(msgs[0].content, "hi there");
    }

    #[test]
    fn test_mock_provider_selected() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert_eq!(create_llm_from_config(&cfg).model_name(), "mock");
    }
}
