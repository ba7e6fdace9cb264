//! 编排错误类型
//!
//! InvalidInput / PlanningFailure 终止整个查询，以结构化错误结果返回给调用方；
//! WorkerNotFound / WorkerExecution 只影响单步，计划继续执行；
//! RecoveryExhausted 表示所有恢复策略都失败，记在指引结果的 data.recovery_error 里；
//! NestingLimit 只出现在嵌套查询的结果里，不影响外层计划。

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HiveError {
    #[error("Invalid query format: {0}")]
    InvalidInput(String),

    #[error("Error during planning: {0}")]
    PlanningFailure(String),

    #[error("Module {0} not found")]
    WorkerNotFound(String),

    #[error("Error in {worker}: {message}")]
    WorkerExecution { worker: String, message: String },

    #[error("Recovery exhausted for {0}")]
    RecoveryExhausted(String),

    #[error("Nested query depth limit {0} reached")]
    NestingLimit(usize),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for HiveError {
    fn from(e: config::ConfigError) -> Self {
        HiveError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = HiveError::WorkerExecution {
            worker: "browser_agent".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Error in browser_agent: boom");
        assert_eq!(
            HiveError::WorkerNotFound("x".into()).to_string(),
            "Module x not found"
        );
    }

    #[test]
    fn test_config_error_converted() {
        let err: HiveError = config::ConfigError::Message("bad key".into()).into();
        assert_eq!(err, HiveError::Config("bad key".into()));
        assert_eq!(err.to_string(), "Config error: bad key");
    }

    #[test]
    fn test_serialize_tagged() {
        let v = serde_json::to_value(HiveError::InvalidInput("Query cannot be None".into())).unwrap();
        assert_eq!(v["kind"], "invalid_input");
        assert_eq!(v["detail"], "Query cannot be None");
    }
}
