//! 单步结果与流式分片
//!
//! StepResult 由 worker（或替代它的恢复策略）产出；派发器在返回前补上 worker_name。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// worker 请求编排器再跑一次完整查询（取代把入口回调交给 worker）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedQuery {
    pub query: String,
    #[serde(default)]
    pub is_background: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, rename = "module")]
    pub worker_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_query: Option<NestedQuery>,
}

impl StepResult {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: StepStatus::Success,
            message: message.into(),
            data: Some(data),
            worker_name: String::new(),
            nested_query: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            message: message.into(),
            data: None,
            worker_name: String::new(),
            nested_query: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_worker(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }

    pub fn with_nested_query(mut self, nested: NestedQuery) -> Self {
        self.nested_query = Some(nested);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// data 中面向用户的回答：answer，其次 demo_result
    pub fn answer(&self) -> Option<&str> {
        let data = self.data.as_ref()?;
        data.get("answer")
            .and_then(Value::as_str)
            .or_else(|| data.get("demo_result").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// data.<key> 的字符串值
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// data 作为对象（非对象时为空）
    pub fn data_object(&self) -> Map<String, Value> {
        match &self.data {
            Some(Value::Object(obj)) => obj.clone(),
            _ => Map::new(),
        }
    }
}

/// 流式分片类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    #[serde(rename = "stream_chunk")]
    Chunk,
    /// 结束分片；content 为空时沿用已累积的文本
    #[serde(rename = "stream_complete")]
    Complete,
    #[serde(rename = "stream_error")]
    Error,
}

impl ChunkKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChunkKind::Chunk)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StreamChunk {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Chunk,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Complete,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Error,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_answer_prefers_answer_then_demo_result() {
        let r = StepResult::success("ok", json!({"answer": "a", "demo_result": "d"}));
        assert_eq!(r.answer(), Some("a"));
        let r = StepResult::success("ok", json!({"demo_result": "d"}));
        assert_eq!(r.answer(), Some("d"));
        assert_eq!(StepResult::error("boom").answer(), None);
    }

    #[test]
    fn test_serialized_shape() {
        let r = StepResult::success("ok", json!({"answer": "hi"})).with_worker("generic_agent");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["module"], "generic_agent");
        assert!(v.get("nested_query").is_none());
    }

    #[test]
    fn test_chunk_wire_names() {
        let v = serde_json::to_value(StreamChunk::complete("Hello")).unwrap();
        assert_eq!(v["type"], "stream_complete");
        assert!(ChunkKind::Error.is_terminal());
        assert!(!ChunkKind::Chunk.is_terminal());
    }
}
