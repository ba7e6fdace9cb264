//! 记忆层：模型对话消息、单次查询上下文、按用户的消息历史、历史预算挑选与持久化

pub mod context;
pub mod conversation;
pub mod history;
pub mod persistence;
pub mod token_budget;
pub mod tokenizer;

pub use context::{Context, ReferencedContent, WorkerFamily, LATEST_RESULT};
pub use conversation::{Message, Role};
pub use history::{HistoryStore, MessageRecord, MessageType};
pub use persistence::HistoryPersistence;
pub use token_budget::{HistorySelector, TokenEstimator};
