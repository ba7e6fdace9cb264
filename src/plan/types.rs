//! 计划与聚合结果

use serde::{Deserialize, Serialize};

use crate::core::HiveError;
use crate::memory::Context;
use crate::workers::{StepResult, StepStatus};

/// 单次 worker 调用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Invocation {
    ModuleCall {
        worker_name: String,
        query_text: String,
        rationale: String,
    },
    IntegrationCall {
        worker_name: String,
        command_text: String,
        rationale: String,
    },
}

impl Invocation {
    pub fn module(
        worker_name: impl Into<String>,
        query_text: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Invocation::ModuleCall {
            worker_name: worker_name.into(),
            query_text: query_text.into(),
            rationale: rationale.into(),
        }
    }

    pub fn integration(
        worker_name: impl Into<String>,
        command_text: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Invocation::IntegrationCall {
            worker_name: worker_name.into(),
            command_text: command_text.into(),
            rationale: rationale.into(),
        }
    }

    pub fn worker_name(&self) -> &str {
        match self {
            Invocation::ModuleCall { worker_name, .. }
            | Invocation::IntegrationCall { worker_name, .. } => worker_name,
        }
    }

    /// 发送给 worker 的文本（query 或 command）
    pub fn input(&self) -> &str {
        match self {
            Invocation::ModuleCall { query_text, .. } => query_text,
            Invocation::IntegrationCall { command_text, .. } => command_text,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            Invocation::ModuleCall { rationale, .. }
            | Invocation::IntegrationCall { rationale, .. } => rationale,
        }
    }

    pub fn is_integration(&self) -> bool {
        matches!(self, Invocation::IntegrationCall { .. })
    }
}

/// 一次规划的产物；解析后不再修改
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub rationale: String,
    pub steps: Vec<String>,
    pub invocations: Vec<Invocation>,
}

/// 执行报告：按计划顺序的每步结果与最终上下文
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub rationale: String,
    pub steps: Vec<String>,
    pub results: Vec<StepResult>,
    /// 去掉 latest_result 的上下文
    pub final_context: Context,
    /// 各成功步骤回答的拼接（也写入历史）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// process_query 的唯一返回值
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub status: StepStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExecutionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HiveError>,
}

impl AggregatedResult {
    pub fn completed(report: ExecutionReport) -> Self {
        Self {
            status: StepStatus::Success,
            message: "Query processed successfully".to_string(),
            data: Some(report),
            error: None,
        }
    }

    pub fn failed(error: HiveError) -> Self {
        Self {
            status: StepStatus::Error,
            message: error.to_string(),
            data: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn results(&self) -> &[StepResult] {
        self.data.as_ref().map(|d| d.results.as_slice()).unwrap_or(&[])
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.data.as_ref()?.final_answer.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_accessors() {
        let call = Invocation::integration("slack", "post hi", "notify");
        assert_eq!(call.worker_name(), "slack");
        assert_eq!(call.input(), "post hi");
        assert!(call.is_integration());
    }

    #[test]
    fn test_failed_result_carries_typed_error() {
        let r = AggregatedResult::failed(HiveError::InvalidInput("Query cannot be None".into()));
        assert!(!r.is_success());
        assert!(r.results().is_empty());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["error"]["kind"], "invalid_input");
    }
}
