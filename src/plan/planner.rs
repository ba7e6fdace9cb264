//! Planner：拼装规划对话、调用模型（连接错误重试一次）、解析计划并保证至少一个调用
//!
//! parse_plan 先整体解析；失败时截取第一个 '{' 到最后一个 '}' 再试一次。

use std::sync::Arc;

use serde_json::Value;

use crate::core::HiveError;
use crate::llm::ModelHandle;
use crate::memory::{Context, HistorySelector, Message, TokenEstimator};
use crate::plan::prompt::{self, PlanCall, REINFORCEMENT};
use crate::plan::{Invocation, Plan};
use crate::workers::WorkerRegistry;

pub struct Planner {
    model: Arc<ModelHandle>,
    registry: Arc<WorkerRegistry>,
    general_worker: String,
    system_prompt: String,
    /// None 表示不带对话历史
    history: Option<HistorySelector>,
}

impl Planner {
    pub fn new(
        model: Arc<ModelHandle>,
        registry: Arc<WorkerRegistry>,
        general_worker: impl Into<String>,
    ) -> Self {
        let general_worker = general_worker.into();
        let system_prompt = prompt::system_prompt(&registry.catalogue(), &general_worker);
        Self {
            model,
            registry,
            general_worker,
            system_prompt,
            history: None,
        }
    }

    pub fn with_history(mut self, selector: Option<HistorySelector>) -> Self {
        self.history = selector;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// system → 历史（按预算挑选）→ 当前查询 →（有历史时）格式强化
    pub fn build_transcript(&self, query: &str, context: &Context) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt.clone())];

        let full_history = context.conversation_history();
        let selected = match &self.history {
            Some(selector) if !full_history.is_empty() => {
                let prompt_tokens = TokenEstimator::estimate(&self.system_prompt);
                let picked = selector.select(full_history, query, prompt_tokens);
                tracing::info!(
                    included = picked.len(),
                    available = full_history.len(),
                    "including conversation history"
                );
                picked
            }
            Some(_) => {
                tracing::debug!("no conversation history available");
                Vec::new()
            }
            None => {
                tracing::debug!("conversation history disabled");
                Vec::new()
            }
        };
        let with_history = !selected.is_empty();
        messages.extend(selected);

        messages.push(Message::user(query));
        if with_history {
            messages.push(Message::system(REINFORCEMENT));
        }
        messages
    }

    pub async fn plan(&self, query: &str, context: &Context) -> Result<Plan, HiveError> {
        let messages = self.build_transcript(query, context);
        let raw = self
            .model
            .complete_with_retry(&messages)
            .await
            .map_err(|e| HiveError::PlanningFailure(e.to_string()))?;

        let plan = parse_plan(&raw)?;
        ensure_invocations(plan, query, &self.registry, &self.general_worker)
    }
}

/// 解析模型输出为 Plan；module_calls 中结构不对的条目跳过并记 warn
pub fn parse_plan(raw: &str) -> Result<Plan, HiveError> {
    let trimmed = raw.trim();
    let doc: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(first) => {
            let extracted = match (trimmed.find('{'), trimmed.rfind('}')) {
                (Some(start), Some(end)) if start < end => &trimmed[start..=end],
                _ => {
                    return Err(HiveError::PlanningFailure(
                        "Could not find JSON in LLM response".to_string(),
                    ))
                }
            };
            serde_json::from_str(extracted)
                .map_err(|e| HiveError::PlanningFailure(format!("{e} (initial error: {first})")))?
        }
    };

    let Value::Object(obj) = doc else {
        return Err(HiveError::PlanningFailure(
            "LLM response is not a JSON object".to_string(),
        ));
    };

    let rationale = obj
        .get("thought_process")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let steps = obj
        .get("plan")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let invocations = obj
        .get("module_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| match serde_json::from_value::<PlanCall>(call.clone()) {
                    Ok(PlanCall::Module { module, query, reason }) => {
                        Some(Invocation::module(module, query, reason))
                    }
                    Ok(PlanCall::Integration {
                        integration,
                        command,
                        reason,
                    }) => Some(Invocation::integration(integration, command, reason)),
                    Err(e) => {
                        tracing::warn!(call = %call, error = %e, "skipping malformed module call");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Plan {
        rationale,
        steps,
        invocations,
    })
}

/// 计划为空时补一个调用：优先通用 worker，否则第一个已注册 worker；都没有则规划失败
pub fn ensure_invocations(
    mut plan: Plan,
    query: &str,
    registry: &WorkerRegistry,
    general_worker: &str,
) -> Result<Plan, HiveError> {
    if !plan.invocations.is_empty() {
        return Ok(plan);
    }

    tracing::warn!(general_worker, "no module_calls provided by LLM, injecting fallback");
    let fallback = if registry.contains(general_worker) {
        Invocation::module(
            general_worker,
            query,
            format!("No specific module was selected, using {general_worker} for conversational response"),
        )
    } else {
        let Some(first) = registry.first() else {
            tracing::error!("no workers registered");
            return Err(HiveError::PlanningFailure(
                "No modules available to process the query".to_string(),
            ));
        };
        let name = first.name().to_string();
        tracing::warn!(fallback = %name, "{general_worker} not registered, using fallback worker");
        Invocation::module(
            name.clone(),
            query,
            format!("{general_worker} not available, using {name} as fallback"),
        )
    };
    plan.invocations.push(fallback);
    if plan.steps.is_empty() {
        plan.steps.push("Provide a conversational response".to_string());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::workers::EchoWorker;

    fn registry(names: &[&str]) -> Arc<WorkerRegistry> {
        let mut reg = WorkerRegistry::new();
        for name in names {
            reg.register(EchoWorker::new(*name));
        }
        Arc::new(reg)
    }

    #[test]
    fn test_parse_plain_json() {
        let plan = parse_plan(
            r#"{"thought_process":"t","plan":["s1"],"module_calls":[{"module":"generic_agent","query":"hi","reason":"r"},{"integration":"slack","command":"post","reason":"n"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.rationale, "t");
        assert_eq!(plan.steps, vec!["s1"]);
        assert_eq!(plan.invocations.len(), 2);
        assert!(plan.invocations[1].is_integration());
    }

    #[test]
    fn test_parse_extracts_embedded_json() {
        let plan = parse_plan(
            "Sure! Here is the plan:\n```json\n{\"plan\":[],\"module_calls\":[{\"module\":\"x\",\"query\":\"q\"}]}\n```",
        )
        .unwrap();
        assert_eq!(plan.invocations[0].worker_name(), "x");
        assert_eq!(plan.invocations[0].rationale(), "");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_plan("I cannot help with that").unwrap_err();
        assert!(matches!(err, HiveError::PlanningFailure(_)));
        assert!(parse_plan("{ not json }").is_err());
    }

    #[test]
    fn test_parse_skips_malformed_calls() {
        let plan = parse_plan(r#"{"module_calls":[{"reason":"no target"},{"module":"a","query":"q"}]}"#).unwrap();
        assert_eq!(plan.invocations.len(), 1);
    }

    #[test]
    fn test_fallback_prefers_general_worker() {
        let reg = registry(&["x", "generic_agent"]);
        let plan = ensure_invocations(Plan::default(), "hello", &reg, "generic_agent").unwrap();
        assert_eq!(plan.invocations.len(), 1);
        assert_eq!(plan.invocations[0].worker_name(), "generic_agent");
        assert_eq!(plan.invocations[0].input(), "hello");
        assert_eq!(plan.steps, vec!["Provide a conversational response"]);
    }

    #[test]
    fn test_fallback_first_registered() {
        let reg = registry(&["x"]);
        let plan = ensure_invocations(Plan::default(), "hello", &reg, "generic_agent").unwrap();
        assert_eq!(plan.invocations[0].worker_name(), "x");
    }

    #[test]
    fn test_fallback_without_workers_fails() {
        let reg = registry(&[]);
        let err = ensure_invocations(Plan::default(), "hello", &reg, "generic_agent").unwrap_err();
        assert_eq!(
            err,
            HiveError::PlanningFailure("No modules available to process the query".into())
        );
    }

    #[test]
    fn test_transcript_without_history() {
        let model = Arc::new(ModelHandle::new(Arc::new(ScriptedLlmClient::default())));
        let planner = Planner::new(model, registry(&["generic_agent"]), "generic_agent")
            .with_history(Some(HistorySelector::new(10_000, 2_000)));
        let msgs = planner.build_transcript("hi", &Context::new("u"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1], Message::user("hi"));
    }

    #[test]
    fn test_transcript_with_history_adds_reinforcement() {
        let model = Arc::new(ModelHandle::new(Arc::new(ScriptedLlmClient::default())));
        let planner = Planner::new(model, registry(&["generic_agent"]), "generic_agent")
            .with_history(Some(HistorySelector::new(10_000, 2_000)));
        let ctx = Context::new("u").with_conversation_history(vec![
            Message::user("write a poem"),
            Message::assistant("Roses are red"),
        ]);
        let msgs = planner.build_transcript("send it to bob", &ctx);
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[3], Message::user("send it to bob"));
        assert_eq!(msgs[4].content, REINFORCEMENT);
    }

    #[test]
    fn test_history_disabled_skips_turns() {
        let model = Arc::new(ModelHandle::new(Arc::new(ScriptedLlmClient::default())));
        let planner = Planner::new(model, registry(&["generic_agent"]), "generic_agent");
        let ctx = Context::new("u").with_conversation_history(vec![Message::user("old")]);
        assert_eq!(planner.build_transcript("new", &ctx).len(), 2);
    }

    #[tokio::test]
    async fn test_plan_maps_llm_failure() {
        let model = Arc::new(ModelHandle::new(Arc::new(ScriptedLlmClient::new(vec![Err(
            "invalid api key".into(),
        )]))));
        let planner = Planner::new(model, registry(&["generic_agent"]), "generic_agent");
        let err = planner.plan("hi", &Context::new("u")).await.unwrap_err();
        assert!(matches!(err, HiveError::PlanningFailure(_)));
    }
}
