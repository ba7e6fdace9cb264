//! Hive - Rust 多模块编排系统
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、构建器、错误类型与恢复策略
//! - **llm**: LLM 客户端抽象、可刷新模型句柄与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 单次查询上下文、按用户的消息历史、历史预算挑选与持久化
//! - **plan**: 规划 prompt、Planner、Executor、进度事件
//! - **resolver**: 历史引用解析（"above"、"[author_agent data]" 等）
//! - **workers**: worker 能力契约、注册表、派发与内置 worker

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod resolver;
pub mod workers;

pub use crate::core::{HiveError, Orchestrator, OrchestratorBuilder};
pub use crate::plan::{AggregatedResult, ProgressEvent};
