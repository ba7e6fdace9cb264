//! 消息历史：按用户隔离的只追加日志
//!
//! 外层 map 只在首次出现某用户时加写锁；每个用户的日志各自一把锁，
//! 不同用户的并发追加互不阻塞，也不会互相改写。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Agent,
}

/// 单条历史记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub user_id: String,
    pub message_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    /// 附加引用信息，如 {"worker": "author_agent"} 或 {"original_query": ..., "was_resolved": true}
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<serde_json::Value>,
}

impl MessageRecord {
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        let prefix = match message_type {
            MessageType::User => "msg",
            MessageType::Agent => "resp",
        };
        Self {
            user_id: user_id.into(),
            message_id: format!("{}_{}", prefix, uuid::Uuid::new_v4()),
            content: content.into(),
            message_type,
            timestamp: Utc::now(),
            references: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_references(mut self, references: serde_json::Value) -> Self {
        self.references = Some(references);
        self
    }

    /// 产生该条内容的 worker 名（仅 agent 记录）
    pub fn source_worker(&self) -> Option<&str> {
        self.references
            .as_ref()
            .and_then(|r| r.get("worker"))
            .and_then(|w| w.as_str())
    }
}

type UserLog = Arc<Mutex<Vec<MessageRecord>>>;

/// 历史存储：user_id -> 只追加日志
#[derive(Default)]
pub struct HistoryStore {
    logs: RwLock<HashMap<String, UserLog>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log_for(&self, user_id: &str) -> UserLog {
        if let Some(log) = self
            .logs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
        {
            return log.clone();
        }
        self.logs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// 追加一条记录到其 user_id 对应的日志
    pub fn append(&self, record: MessageRecord) {
        let log = self.log_for(&record.user_id);
        log.lock().unwrap_or_else(|e| e.into_inner()).push(record);
    }

    /// 便捷方法：追加 agent 回复，并记录来源 worker
    pub fn append_agent(&self, user_id: &str, worker_name: &str, content: &str) {
        self.append(
            MessageRecord::new(user_id, content, MessageType::Agent)
                .with_references(serde_json::json!({ "worker": worker_name })),
        );
    }

    /// 某用户的全部记录（按写入顺序）
    pub fn messages(&self, user_id: &str) -> Vec<MessageRecord> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        match logs.get(user_id) {
            Some(log) => log.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Vec::new(),
        }
    }

    /// 最近一条 agent 记录；给定 worker 时只看该 worker 产生的记录
    pub fn last_agent_message(&self, user_id: &str, worker: Option<&str>) -> Option<MessageRecord> {
        self.messages(user_id)
            .into_iter()
            .rev()
            .filter(|m| m.message_type == MessageType::Agent)
            .find(|m| match worker {
                Some(name) => m.source_worker() == Some(name),
                None => true,
            })
    }

    /// 全部用户的记录快照（用于持久化）
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<MessageRecord> = logs
            .values()
            .flat_map(|log| log.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .collect();
        all.sort_by_key(|m| m.timestamp);
        all
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.messages(user_id).len()
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_per_user() {
        let store = HistoryStore::new();
        store.append(MessageRecord::new("alice", "hi", MessageType::User));
        store.append(MessageRecord::new("bob", "yo", MessageType::User));
        store.append_agent("alice", "generic_agent", "hello alice");

        assert_eq!(store.len("alice"), 2);
        assert_eq!(store.len("bob"), 1);
        assert!(store.is_empty("carol"));
    }

    #[test]
    fn test_last_agent_message_by_worker() {
        let store = HistoryStore::new();
        store.append_agent("u", "author_agent", "blog post");
        store.append_agent("u", "browser_agent", "search hits");

        let last = store.last_agent_message("u", None).unwrap();
        assert_eq!(last.content, "search hits");

        let author = store.last_agent_message("u", Some("author_agent")).unwrap();
        assert_eq!(author.content, "blog post");
        assert!(store.last_agent_message("u", Some("nobody")).is_none());
    }

    #[test]
    fn test_message_ids_are_prefixed() {
        let user = MessageRecord::new("u", "q", MessageType::User);
        let agent = MessageRecord::new("u", "a", MessageType::Agent);
        assert!(user.message_id.starts_with("msg_"));
        assert!(agent.message_id.starts_with("resp_"));
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(HistoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.append(MessageRecord::new(
                            format!("user{}", i % 2),
                            format!("m{j}"),
                            MessageType::User,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len("user0"), 200);
        assert_eq!(store.len("user1"), 200);
    }
}
