//! Executor：按计划顺序逐个派发调用
//!
//! 每步：推送开始事件 → 查找 worker（未注册记一条错误并继续）→ 派发 → 成功则写回 Context 与历史，
//! 失败则交给恢复策略 → 推送完成事件。任何单步失败都不会中断后续步骤。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::RecoveryEngine;
use crate::memory::{Context, HistoryStore, MessageRecord, MessageType};
use crate::plan::{emit, AggregatedResult, ExecutionReport, Invocation, Plan, ProgressEvent, ProgressSink};
use crate::workers::{dispatch, NestedQuery, StepResult, WorkerDispatcher};

/// 执行 worker 请求的嵌套查询（由编排器实现，负责深度限制）
#[async_trait]
pub trait NestedQueryHandler: Send + Sync {
    async fn run_nested(&self, request: NestedQuery, user_id: &str) -> AggregatedResult;
}

pub struct Executor {
    dispatcher: Arc<WorkerDispatcher>,
    recovery: Arc<RecoveryEngine>,
    history: Arc<HistoryStore>,
}

impl Executor {
    pub fn new(
        dispatcher: Arc<WorkerDispatcher>,
        recovery: Arc<RecoveryEngine>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            dispatcher,
            recovery,
            history,
        }
    }

    pub async fn execute(
        &self,
        plan: Plan,
        mut context: Context,
        sink: Option<&dyn ProgressSink>,
        nested: Option<&dyn NestedQueryHandler>,
    ) -> AggregatedResult {
        let total = plan.invocations.len();
        let mut results = Vec::with_capacity(total);

        for (index, invocation) in plan.invocations.iter().enumerate() {
            let step = index + 1;
            let name = invocation.worker_name();
            tracing::info!(step, total, worker = name, "executing step");
            emit(sink, start_event(invocation, step, total)).await;

            let result = if !self.dispatcher.registry().contains(name) {
                tracing::warn!(worker = name, "worker not registered, skipping step");
                dispatch::not_found(name)
            } else {
                let result = self
                    .dispatcher
                    .dispatch(name, invocation.input(), &context, sink)
                    .await;
                if result.is_success() {
                    let result = self.attach_nested(result, context.user_id(), nested).await;
                    self.record_success(&mut context, name, &result);
                    result
                } else {
                    tracing::warn!(worker = name, error = %result.message, "step failed");
                    let recovered = self
                        .recovery
                        .recover(name, &result, invocation, &context, sink)
                        .await;
                    if recovered.is_success() {
                        tracing::info!(worker = name, message = %recovered.message, "step recovered");
                        self.record_success(&mut context, name, &recovered);
                    }
                    recovered
                }
            };

            emit(sink, complete_event(invocation, step, total, result.clone())).await;
            results.push(result);
        }

        let final_answer = results
            .iter()
            .filter(|r| r.is_success())
            .filter_map(StepResult::answer)
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string();
        let final_answer = (!final_answer.is_empty()).then_some(final_answer);
        if let Some(answer) = &final_answer {
            self.history.append(
                MessageRecord::new(context.user_id(), answer.clone(), MessageType::Agent)
                    .with_message_id(format!("resp_final_{}", uuid::Uuid::new_v4()))
                    .with_references(json!({ "final": true })),
            );
        }

        tracing::info!(steps = total, "query processing complete");
        AggregatedResult::completed(ExecutionReport {
            rationale: plan.rationale,
            steps: plan.steps,
            results,
            final_context: context.without_latest_result(),
            final_answer,
        })
    }

    /// context[worker] 与 latest_result；有回答时写入历史。替代 worker 的结果也记在其自身名下
    fn record_success(&self, context: &mut Context, invocation_worker: &str, result: &StepResult) {
        let Some(data) = result.data.clone() else {
            return;
        };
        if !result.worker_name.is_empty() && result.worker_name != invocation_worker {
            context.record_step(&result.worker_name, data.clone());
        }
        context.record_step(invocation_worker, data);

        if let Some(answer) = result.answer() {
            let source = if result.worker_name.is_empty() {
                invocation_worker
            } else {
                &result.worker_name
            };
            self.history.append_agent(context.user_id(), source, answer);
        }
    }

    async fn attach_nested(
        &self,
        mut result: StepResult,
        user_id: &str,
        nested: Option<&dyn NestedQueryHandler>,
    ) -> StepResult {
        let Some(request) = result.nested_query.take() else {
            return result;
        };

        let nested_value = match nested {
            Some(handler) => {
                tracing::info!(worker = %result.worker_name, query = %request.query, "running nested query");
                let outcome = handler.run_nested(request, user_id).await;
                serde_json::to_value(&outcome).unwrap_or(Value::Null)
            }
            None => {
                tracing::warn!(worker = %result.worker_name, "nested query requested but not allowed here");
                json!({ "status": "error", "message": "Nested queries are not available" })
            }
        };

        match &mut result.data {
            Some(Value::Object(obj)) => {
                obj.insert("nested_result".into(), nested_value);
            }
            other => {
                let original = other.take();
                let mut data = json!({ "nested_result": nested_value });
                if let Some(original) = original {
                    data["original"] = original;
                }
                *other = Some(data);
            }
        }
        result
    }
}

fn start_event(invocation: &Invocation, step: usize, total: usize) -> ProgressEvent {
    let name = invocation.worker_name().to_string();
    let message = invocation.rationale().to_string();
    if invocation.is_integration() {
        ProgressEvent::IntegrationStart {
            step,
            total_steps: total,
            integration: name,
            message,
        }
    } else {
        ProgressEvent::ModuleStart {
            step,
            total_steps: total,
            module: name,
            message,
        }
    }
}

fn complete_event(invocation: &Invocation, step: usize, total: usize, result: StepResult) -> ProgressEvent {
    let name = invocation.worker_name().to_string();
    if invocation.is_integration() {
        ProgressEvent::IntegrationComplete {
            step,
            total_steps: total,
            integration: name,
            result,
        }
    } else {
        ProgressEvent::ModuleComplete {
            step,
            total_steps: total,
            module: name,
            result,
        }
    }
}
