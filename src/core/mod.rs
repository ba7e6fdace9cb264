//! 核心编排层：错误类型、恢复策略、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;

pub use builder::OrchestratorBuilder;
pub use error::HiveError;
pub use orchestrator::{create_llm_from_config, llm_factory_from_config, Orchestrator};
pub use recovery::{classify, Alternative, ErrorClass, RecoveryEngine, EMAIL_SUGGESTIONS};
