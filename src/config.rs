//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__PLANNER__MAX_CONVERSATION_TOKENS=4000`）。
//! 每个键都有默认值，空配置即可运行。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::HiveError;
use crate::llm::{default_transient_markers, RetryConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub recovery: RecoverySection,
    pub workers: WorkersSection,
}

/// [app] 段：应用名、默认用户、历史文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 调用方未给出身份时使用
    pub default_user: String,
    /// 设置后启动时载入、退出时写回消息历史（JSON）
    pub history_file: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_user: "default_user".to_string(),
            history_file: None,
        }
    }
}

/// [llm] 段：后端选择与连接错误重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 连接错误后刷新客户端再重试前的等待
    pub refresh_backoff_ms: u64,
    /// 错误文本包含其一即视为瞬时连接错误
    pub transient_error_markers: Vec<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            refresh_backoff_ms: 1500,
            transient_error_markers: default_transient_markers(),
        }
    }
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            backoff: Duration::from_millis(self.refresh_backoff_ms),
            transient_markers: self
                .transient_error_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }
}

/// [planner] 段：是否带对话历史及其 token 预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub enable_conversation_history: bool,
    pub max_conversation_tokens: usize,
    pub response_reserve_tokens: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            enable_conversation_history: true,
            max_conversation_tokens: 10_000,
            response_reserve_tokens: 2_000,
        }
    }
}

/// [recovery] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// 限流错误重试前的等待
    pub rate_limit_delay_ms: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: 2000,
        }
    }
}

impl RecoverySection {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

/// [workers] 段：规划兜底、派发与恢复中被特殊对待的 worker 名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersSection {
    pub general: String,
    pub communication: String,
    pub blockchain: String,
    pub research: String,
    pub browser: String,
    /// worker 触发嵌套查询的最大深度
    pub max_nested_depth: usize,
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            general: "generic_agent".to_string(),
            communication: "communication_agent".to_string(),
            blockchain: "solana_agent".to_string(),
            research: "deepresearch_agent".to_string(),
            browser: "browser_agent".to_string(),
            max_nested_depth: 2,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, HiveError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.default_user, "default_user");
        assert!(cfg.planner.enable_conversation_history);
        assert_eq!(cfg.planner.max_conversation_tokens, 10_000);
        assert_eq!(cfg.recovery.rate_limit_delay(), Duration::from_secs(2));
        assert_eq!(cfg.workers.general, "generic_agent");
        assert_eq!(cfg.workers.max_nested_depth, 2);
        assert_eq!(cfg.llm.retry_config().backoff, Duration::from_millis(1500));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[planner]\nenable_conversation_history = false\n\n[workers]\ngeneral = \"chat_agent\"\n\n[llm]\nprovider = \"mock\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert!(!cfg.planner.enable_conversation_history);
        assert_eq!(cfg.planner.max_conversation_tokens, 10_000);
        assert_eq!(cfg.workers.general, "chat_agent");
        assert_eq!(cfg.workers.browser, "browser_agent");
        assert_eq!(cfg.llm.provider, "mock");
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[planner]\nmax_conversation_tokens = \"lots\"").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, HiveError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/hive.toml"))).unwrap();
        assert_eq!(cfg.recovery.rate_limit_delay_ms, 2000);
    }
}
