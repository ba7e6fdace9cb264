//! Echo worker（离线演示与测试用）

use serde_json::{json, Value};

use crate::workers::{Capabilities, StepResult, Worker, WorkerError};

/// 回显输入；若上一步有回答则一并带上
pub struct EchoWorker {
    name: String,
}

impl EchoWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoWorker {
    fn default() -> Self {
        Self::new("echo_agent")
    }
}

impl Worker for EchoWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new("Echo the query text back (for testing)")
            .with_capabilities(["Repeat text verbatim"])
            .with_examples(["echo hello world"])
    }

    fn process(&self, query: &str, context: &Value) -> Result<StepResult, WorkerError> {
        let previous = context
            .get("latest_result")
            .and_then(|r| r.get("answer"))
            .and_then(Value::as_str);
        let mut data = json!({ "answer": query, "content": query });
        if let Some(previous) = previous {
            data["previous_answer"] = Value::String(previous.to_string());
        }
        Ok(StepResult::success("Echoed", data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_carries_previous_answer() {
        let view = json!({ "latest_result": { "answer": "earlier" } });
        let r = EchoWorker::default().process("hi", &view).unwrap();
        assert_eq!(r.answer(), Some("hi"));
        assert_eq!(r.data_str("previous_answer"), Some("earlier"));
    }
}
