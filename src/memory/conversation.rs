//! 模型对话消息
//!
//! Planner 拼装给 LLM 的消息序列（system / user / assistant），
//! 也是调用方传入的 conversation_history 的元素类型。

use serde::{Deserialize, Serialize};

use crate::memory::{MessageRecord, MessageType};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 历史记录转为对话消息：用户消息为 user，worker 回答为 assistant
impl From<&MessageRecord> for Message {
    fn from(record: &MessageRecord) -> Self {
        match record.message_type {
            MessageType::User => Message::user(record.content.clone()),
            MessageType::Agent => Message::assistant(record.content.clone()),
        }
    }
}
