//! DeepSeek 端点（OpenAI 兼容格式）
//!
//! 规划默认用 deepseek-chat；deepseek-reasoner 输出较慢，但 JSON 计划更稳定。

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 解析 DeepSeek 模型名：显式参数 > `DEEPSEEK_MODEL` > deepseek-chat
pub fn resolve_deepseek_model(model: Option<&str>) -> String {
    model
        .filter(|m| !m.trim().is_empty())
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string())
}

/// 创建 DeepSeek 客户端；Key 取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
pub fn create_deepseek_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let model = resolve_deepseek_model(model);
    let base_url = base_url.unwrap_or(DEEPSEEK_BASE_URL);

    tracing::debug!(model = %model, base_url, "creating DeepSeek client");
    OpenAiClient::new(Some(base_url), &model, api_key.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;

    #[test]
    fn test_explicit_model_wins() {
        assert_eq!(resolve_deepseek_model(Some(DEEPSEEK_REASONER)), DEEPSEEK_REASONER);
    }

    #[test]
    fn test_client_uses_resolved_model() {
        let client = create_deepseek_client(Some("deepseek-chat"), None);
        assert_eq!(client.model_name(), "deepseek-chat");
    }
}
