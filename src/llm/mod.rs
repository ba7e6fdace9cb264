//! LLM 层：客户端抽象、可刷新的模型句柄与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod handle;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use handle::{LlmFactory, ModelHandle};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{default_transient_markers, LlmClient, RetryConfig};
