//! 单次查询的上下文存储
//!
//! 每次 process_query 独占一个 Context：按 worker 名保存其最近一次输出的 data，
//! 外加 latest_result、用户身份、流式开关、调用方传入的对话历史与已解析的引用内容。
//!
//! 引用内容按 worker 家族只写一个规范字段（blog_post / search_results / research / content）；
//! 各 worker 习惯读取的别名（article、result、summary、顶层 answer/content 等）
//! 只在 worker_view 中于派发边界生成，存储本身的 schema 保持有界。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::memory::Message;

/// latest_result 保留键名
pub const LATEST_RESULT: &str = "latest_result";

/// worker 家族：决定引用内容写入的规范字段与兼容别名
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFamily {
    Author,
    Browser,
    Research,
    General,
}

impl WorkerFamily {
    /// 按 worker 名归类（子串匹配，author > browser > research）
    pub fn from_worker_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("author") {
            Self::Author
        } else if name.contains("browser") {
            Self::Browser
        } else if name.contains("research") {
            Self::Research
        } else {
            Self::General
        }
    }

    /// 规范字段
    pub fn canonical_key(self) -> &'static str {
        match self {
            Self::Author => "blog_post",
            Self::Browser => "search_results",
            Self::Research => "research",
            Self::General => "content",
        }
    }

    /// 仅在 worker_view 中出现的兼容别名
    fn compat_aliases(self) -> &'static [&'static str] {
        match self {
            Self::Author => &["article"],
            Self::Browser => &["result"],
            Self::Research => &["summary"],
            Self::General => &[],
        }
    }
}

/// 已解析的历史引用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedContent {
    pub content: String,
    pub source_worker: String,
    /// 查询中命中的占位符，如 "[author_agent data]"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ReferencedContent {
    pub fn family(&self) -> WorkerFamily {
        WorkerFamily::from_worker_name(&self.source_worker)
    }
}

/// 单次查询的上下文
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    user_id: String,
    #[serde(default)]
    enable_streaming: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conversation_history: Vec<Message>,
    #[serde(default)]
    entries: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    references: Vec<ReferencedContent>,
    /// 引用解析之后又被步骤写过的 worker；视图里不再给它们套引用别名
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    refreshed: BTreeSet<String>,
}

impl Context {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// 调用方是否允许流式派发
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.enable_streaming = enabled;
        self
    }

    pub fn with_conversation_history(mut self, history: Vec<Message>) -> Self {
        self.conversation_history = history;
        self
    }

    /// 预置某个 worker 的输出（调用方带入的先前上下文）
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    pub fn streaming_enabled(&self) -> bool {
        self.enable_streaming
    }

    pub fn conversation_history(&self) -> &[Message] {
        &self.conversation_history
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn latest_result(&self) -> Option<&Value> {
        self.latest_result.as_ref()
    }

    pub fn references(&self) -> &[ReferencedContent] {
        &self.references
    }

    /// 步骤完成后写入：context[worker] = data，latest_result = data
    pub fn record_step(&mut self, worker_name: &str, data: Value) {
        self.entries.insert(worker_name.to_string(), data.clone());
        self.refreshed.insert(worker_name.to_string());
        self.latest_result = Some(data);
    }

    /// 把引用内容物化到来源 worker 名下（新建或合并 {status, message, data:{answer, content}}），
    /// 并写入 latest_result
    pub fn attach_reference(&mut self, reference: ReferencedContent) {
        let content = Value::String(reference.content.clone());
        let canonical = reference.family().canonical_key();

        let mut entry = match self.entries.remove(&reference.source_worker) {
            Some(Value::Object(obj)) => obj,
            previous => {
                let mut obj = Map::new();
                obj.insert("status".into(), json!("success"));
                obj.insert("message".into(), json!("Content from previous message"));
                let data = match previous {
                    Some(original) => json!({ "original": original }),
                    None => json!({}),
                };
                obj.insert("data".into(), data);
                obj
            }
        };
        let data = entry
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !data.is_object() {
            let original = data.take();
            *data = json!({ "original": original });
        }
        if let Value::Object(data) = data {
            data.insert("answer".into(), content.clone());
            data.insert("content".into(), content.clone());
            data.insert(canonical.into(), content.clone());
        }
        self.entries
            .insert(reference.source_worker.clone(), Value::Object(entry));

        self.latest_result = Some(json!({
            "answer": reference.content,
            "content": reference.content,
        }));
        self.refreshed.remove(&reference.source_worker);
        self.references.push(reference);
    }

    /// 返回给调用方的 final_context：去掉 latest_result 的浅拷贝
    pub fn without_latest_result(&self) -> Context {
        Context {
            latest_result: None,
            ..self.clone()
        }
    }

    /// worker 在派发边界看到的兼容视图：普通 JSON 对象，补齐各家族的别名键
    pub fn worker_view(&self) -> Value {
        let mut view: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(latest) = &self.latest_result {
            view.insert(LATEST_RESULT.into(), latest.clone());
        }
        view.insert("user_id".into(), Value::String(self.user_id.clone()));
        view.insert("enable_streaming".into(), Value::Bool(self.enable_streaming));
        if !self.conversation_history.is_empty() {
            view.insert(
                "conversation_history".into(),
                serde_json::to_value(&self.conversation_history).unwrap_or(Value::Null),
            );
        }

        for reference in &self.references {
            let content = Value::String(reference.content.clone());
            let family = reference.family();
            let mut keys = vec!["answer", "content", family.canonical_key()];
            keys.extend_from_slice(family.compat_aliases());

            let entry = if self.refreshed.contains(&reference.source_worker) {
                None
            } else {
                view.get_mut(&reference.source_worker)
            };
            if let Some(Value::Object(entry)) = entry {
                for key in &keys {
                    entry.insert((*key).into(), content.clone());
                }
                if let Some(Value::Object(data)) = entry.get_mut("data") {
                    for key in family.compat_aliases() {
                        data.insert((*key).into(), content.clone());
                    }
                }
            }
            view.insert("referenced_content".into(), content.clone());
            view.insert("content".into(), content.clone());
            view.insert("answer".into(), content);
        }

        Value::Object(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_step_sets_latest() {
        let mut ctx = Context::new("u");
        ctx.record_step("browser_agent", json!({"answer": "found"}));
        assert_eq!(ctx.get("browser_agent"), Some(&json!({"answer": "found"})));
        assert_eq!(ctx.latest_result(), Some(&json!({"answer": "found"})));
    }

    #[test]
    fn test_without_latest_result() {
        let mut ctx = Context::new("u");
        ctx.record_step("w", json!({"x": 1}));
        let final_ctx = ctx.without_latest_result();
        assert!(final_ctx.latest_result().is_none());
        assert_eq!(final_ctx.get("w"), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_family_from_name() {
        assert_eq!(WorkerFamily::from_worker_name("author_agent"), WorkerFamily::Author);
        assert_eq!(WorkerFamily::from_worker_name("browser_agent"), WorkerFamily::Browser);
        assert_eq!(
            WorkerFamily::from_worker_name("deepresearch_agent"),
            WorkerFamily::Research
        );
        assert_eq!(WorkerFamily::from_worker_name("generic_agent"), WorkerFamily::General);
    }

    #[test]
    fn test_attach_reference_creates_entry() {
        let mut ctx = Context::new("u");
        ctx.attach_reference(ReferencedContent {
            content: "My blog".into(),
            source_worker: "author_agent".into(),
            placeholder: Some("[author_agent data]".into()),
        });

        let entry = ctx.get("author_agent").unwrap();
        assert_eq!(entry["status"], "success");
        assert_eq!(entry["data"]["answer"], "My blog");
        assert_eq!(entry["data"]["content"], "My blog");
        assert_eq!(entry["data"]["blog_post"], "My blog");
        // 别名不进入存储
        assert!(entry["data"].get("article").is_none());
        assert_eq!(ctx.latest_result().unwrap()["content"], "My blog");
    }

    #[test]
    fn test_attach_reference_merges_existing() {
        let mut ctx = Context::new("u").with_entry("browser_agent", json!({"data": {"hits": 3}}));
        ctx.attach_reference(ReferencedContent {
            content: "results".into(),
            source_worker: "browser_agent".into(),
            placeholder: None,
        });
        let entry = ctx.get("browser_agent").unwrap();
        assert_eq!(entry["data"]["hits"], 3);
        assert_eq!(entry["data"]["search_results"], "results");
    }

    #[test]
    fn test_attach_reference_wraps_scalar() {
        let mut ctx = Context::new("u").with_entry("notes_agent", json!("old"));
        ctx.attach_reference(ReferencedContent {
            content: "new".into(),
            source_worker: "notes_agent".into(),
            placeholder: None,
        });
        let entry = ctx.get("notes_agent").unwrap();
        assert_eq!(entry["data"]["original"], "old");
        assert_eq!(entry["data"]["content"], "new");
    }

    #[test]
    fn test_worker_view_aliases() {
        let mut ctx = Context::new("u");
        ctx.attach_reference(ReferencedContent {
            content: "deep dive".into(),
            source_worker: "deepresearch_agent".into(),
            placeholder: None,
        });
        let view = ctx.worker_view();
        assert_eq!(view["deepresearch_agent"]["research"], "deep dive");
        assert_eq!(view["deepresearch_agent"]["summary"], "deep dive");
        assert_eq!(view["deepresearch_agent"]["data"]["summary"], "deep dive");
        assert_eq!(view["referenced_content"], "deep dive");
        assert_eq!(view["answer"], "deep dive");
        assert_eq!(view[LATEST_RESULT]["answer"], "deep dive");
        assert_eq!(view["user_id"], "u");
    }

    #[test]
    fn test_step_output_replaces_reference_in_view() {
        let mut ctx = Context::new("u");
        ctx.attach_reference(ReferencedContent {
            content: "OLD".into(),
            source_worker: "author_agent".into(),
            placeholder: Some("[author_agent data]".into()),
        });
        ctx.record_step("author_agent", json!({"answer": "revised", "content": "NEW"}));

        let view = ctx.worker_view();
        assert_eq!(view["author_agent"], json!({"answer": "revised", "content": "NEW"}));
        assert_eq!(view[LATEST_RESULT]["content"], "NEW");
        assert_eq!(view["referenced_content"], "OLD");
    }
}
