//! 错误恢复策略
//!
//! 对失败步骤的错误消息做大小写无关的子串匹配，按固定顺序取第一个命中的类别：
//! 邮件收件人校验 → 鉴权 → 限流 → 文件缺失 → 能力不可用 → 区块链标识无效 → 其它。
//! 每个类别对应一种补救方式（重试、换用替代 worker、生成用户指引）；结果总是一条 StepResult。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::WorkersSection;
use crate::core::HiveError;
use crate::llm::ModelHandle;
use crate::memory::{Context, Message};
use crate::plan::{emit, Invocation, ProgressEvent, ProgressSink};
use crate::workers::{StepResult, StepStatus, WorkerDispatcher};

pub const EMAIL_SUGGESTIONS: [&str; 3] = [
    "Use test@wavehq.ai for testing",
    "Update the recipient to your registered email",
    "Contact support to add approved domains",
];

/// 错误类别（按匹配顺序）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    EmailValidation,
    Authentication,
    RateLimit,
    FileNotFound,
    Unavailable,
    InvalidIdentifier,
    Other,
}

impl ErrorClass {
    /// 写入 data.error_type 的名称
    pub fn error_type(self) -> &'static str {
        match self {
            ErrorClass::EmailValidation => "email_validation",
            ErrorClass::Authentication => "authentication",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::FileNotFound => "file_not_found",
            ErrorClass::Unavailable => "module_unavailable",
            ErrorClass::InvalidIdentifier => "invalid_identifier",
            ErrorClass::Other => "module_error",
        }
    }
}

/// 分类；邮件与区块链两类只对指定 worker 生效
pub fn classify(worker_name: &str, message: &str, workers: &WorkersSection) -> ErrorClass {
    let msg = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if worker_name == workers.communication && has(&["invalid `to` field"]) {
        ErrorClass::EmailValidation
    } else if has(&["api key", "authentication"]) {
        ErrorClass::Authentication
    } else if has(&["rate limit", "too many requests"]) {
        ErrorClass::RateLimit
    } else if has(&["file not found", "no such file"]) {
        ErrorClass::FileNotFound
    } else if has(&["not available", "not implemented"]) {
        ErrorClass::Unavailable
    } else if worker_name == workers.blockchain
        && has(&["no valid solana program id", "invalid contract address"])
    {
        ErrorClass::InvalidIdentifier
    } else {
        ErrorClass::Other
    }
}

/// 替代 worker 建议
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Alternative {
    pub name: String,
    pub reason: String,
}

fn alt(name: &str, reason: &str) -> Alternative {
    Alternative {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// 静态替代表
pub fn alternatives_for(failed: &str, workers: &WorkersSection) -> Vec<Alternative> {
    let w = workers;
    if failed == w.communication {
        vec![
            alt("author_agent", "Create email drafts without sending"),
            alt(&w.general, "Get help with email content"),
        ]
    } else if failed == w.browser {
        vec![
            alt(&w.research, "Research information online"),
            alt(&w.general, "Answer questions without browsing"),
        ]
    } else if failed == "github_agent" {
        vec![
            alt(&w.general, "Get coding help without GitHub access"),
            alt("documents_agent", "Work with local code files"),
        ]
    } else if failed == "scheduling_agent" {
        vec![
            alt(&w.general, "Get scheduling advice"),
            alt("author_agent", "Create calendar event descriptions"),
        ]
    } else if failed == w.blockchain {
        vec![
            alt(&w.research, "Research blockchain projects and tokens"),
            alt(&w.browser, "Search for project information online"),
            alt(&w.general, "Get general information about the topic"),
        ]
    } else {
        Vec::new()
    }
}

fn recipient_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"to=([^,\s]+)").ok()).as_ref()
}

fn filename_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']+\.[a-zA-Z]+)["']"#).ok())
        .as_ref()
}

/// 第一个捕获组
fn capture(pattern: Option<&Regex>, text: &str) -> Option<String> {
    pattern?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

pub struct RecoveryEngine {
    dispatcher: Arc<WorkerDispatcher>,
    model: Arc<ModelHandle>,
    workers: WorkersSection,
    rate_limit_delay: Duration,
}

impl RecoveryEngine {
    pub fn new(
        dispatcher: Arc<WorkerDispatcher>,
        model: Arc<ModelHandle>,
        workers: WorkersSection,
        rate_limit_delay: Duration,
    ) -> Self {
        Self {
            dispatcher,
            model,
            workers,
            rate_limit_delay,
        }
    }

    /// 处理一次失败的步骤；status=success 时调用方用它替换原结果
    pub async fn recover(
        &self,
        worker_name: &str,
        failed: &StepResult,
        invocation: &Invocation,
        context: &Context,
        sink: Option<&dyn ProgressSink>,
    ) -> StepResult {
        let class = classify(worker_name, &failed.message, &self.workers);
        tracing::info!(worker = worker_name, class = ?class, error = %failed.message, "recovering failed step");

        let result = match class {
            ErrorClass::EmailValidation => self.email_guidance(worker_name, invocation, sink).await,
            ErrorClass::Authentication => self.auth_guidance(worker_name, sink).await,
            ErrorClass::RateLimit => self.retry_after_rate_limit(worker_name, invocation, context).await,
            ErrorClass::FileNotFound => file_guidance(worker_name, &failed.message),
            ErrorClass::Unavailable => self.try_alternative(worker_name, invocation, context).await,
            ErrorClass::InvalidIdentifier => self.research_cascade(worker_name, invocation, context).await,
            ErrorClass::Other => self.explain(worker_name, failed, invocation, sink).await,
        };
        if result.worker_name.is_empty() {
            result.with_worker(worker_name)
        } else {
            result
        }
    }

    async fn email_guidance(
        &self,
        worker_name: &str,
        invocation: &Invocation,
        sink: Option<&dyn ProgressSink>,
    ) -> StepResult {
        let address = capture(recipient_pattern(), invocation.input())
            .unwrap_or_else(|| "the email address".to_string());

        let guidance = format!(
            "The email address ({address}) was rejected by the system.\n\n\
             Our email system only delivers to pre-approved recipients. You can:\n\n\
             1. Use a test address (e.g., test@wavehq.ai)\n\
             2. Send to your own registered email address\n\
             3. Contact support to add approved recipients\n\n\
             Would you like me to update the email with a valid recipient?"
        );
        emit(
            sink,
            ProgressEvent::ErrorGuidance {
                module: worker_name.to_string(),
                message: guidance.clone(),
            },
        )
        .await;

        StepResult::success(
            "Email address validation failed",
            json!({
                "answer": guidance,
                "error_type": ErrorClass::EmailValidation.error_type(),
                "recipient": address,
                "suggestions": EMAIL_SUGGESTIONS,
            }),
        )
    }

    async fn auth_guidance(&self, worker_name: &str, sink: Option<&dyn ProgressSink>) -> StepResult {
        let guidance = format!(
            "It looks like {worker_name} is missing required authentication credentials.\n\n\
             This can happen when API keys are not configured for it, your account lacks access \
             to this feature, or the service is temporarily unavailable.\n\n\
             You can try a different module for this task, check your account settings, \
             or contact support if this feature should be available."
        );
        emit(
            sink,
            ProgressEvent::ErrorGuidance {
                module: worker_name.to_string(),
                message: guidance.clone(),
            },
        )
        .await;

        StepResult::error("Authentication required").with_data(json!({
            "answer": guidance,
            "error_type": ErrorClass::Authentication.error_type(),
            "module": worker_name,
        }))
    }

    /// 等待固定时长后原样重试一次（与正常派发相同的执行方式）
    async fn retry_after_rate_limit(
        &self,
        worker_name: &str,
        invocation: &Invocation,
        context: &Context,
    ) -> StepResult {
        tracing::info!(worker = worker_name, delay_ms = self.rate_limit_delay.as_millis() as u64, "rate limited, retrying once");
        tokio::time::sleep(self.rate_limit_delay).await;

        let retry = self
            .dispatcher
            .dispatch(worker_name, invocation.input(), context, None)
            .await;
        if retry.is_success() {
            tracing::info!(worker = worker_name, "recovered from rate limit");
            return retry;
        }
        tracing::warn!(worker = worker_name, error = %retry.message, "retry after rate limit failed");

        StepResult::error("Service temporarily unavailable").with_data(json!({
            "answer": "The service is currently rate-limited, usually because too many requests were \
                       made in a short time or it is under heavy load.\n\n\
                       Please wait a moment and try again, or I can help with an alternative approach.",
            "error_type": ErrorClass::RateLimit.error_type(),
            "module": worker_name,
        }))
    }

    /// 查替代表，自动尝试第一个已注册的替代 worker
    async fn try_alternative(
        &self,
        worker_name: &str,
        invocation: &Invocation,
        context: &Context,
    ) -> StepResult {
        let registry = self.dispatcher.registry();
        let mut alternatives: Vec<Alternative> = alternatives_for(worker_name, &self.workers)
            .into_iter()
            .filter(|a| registry.contains(&a.name))
            .collect();
        if alternatives.is_empty() && registry.contains(&self.workers.general) {
            alternatives.push(alt(
                &self.workers.general,
                "Provide general assistance with your request",
            ));
        }

        if let Some(first) = alternatives.first() {
            tracing::info!(worker = worker_name, alternative = %first.name, "trying alternative worker");
            let mut result = self
                .dispatcher
                .dispatch(&first.name, invocation.input(), context, None)
                .await;
            if result.is_success() {
                result.message = format!("Used {} as alternative", first.name);
                return result;
            }
            tracing::warn!(alternative = %first.name, error = %result.message, "alternative worker also failed");
        }

        let exhausted = HiveError::RecoveryExhausted(worker_name.to_string());
        tracing::warn!(worker = worker_name, error = %exhausted, "no alternative worker succeeded");
        let suggestions: Vec<String> = alternatives
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.reason))
            .collect();
        let guidance = format!(
            "The {worker_name} module encountered an issue.\n\n\
             Here are some alternatives that might help:\n{}\n\n\
             Would you like me to try one of these alternatives?",
            suggestions.join("\n")
        );
        StepResult::error("Module unavailable").with_data(json!({
            "answer": guidance,
            "error_type": ErrorClass::Unavailable.error_type(),
            "alternatives": alternatives,
            "module": worker_name,
            "recovery_error": exhausted,
        }))
    }

    /// 研究 → 浏览 → 通用，依次各试一次；全部失败时仍给出可读回答
    async fn research_cascade(
        &self,
        worker_name: &str,
        invocation: &Invocation,
        context: &Context,
    ) -> StepResult {
        let w = &self.workers;
        let cascade = [
            (&w.research, "general research"),
            (&w.browser, "web search"),
            (&w.general, "general assistance"),
        ];
        let registry = self.dispatcher.registry();

        for (candidate, purpose) in cascade {
            if !registry.contains(candidate) {
                continue;
            }
            let mut result = self
                .dispatcher
                .dispatch(candidate, invocation.input(), context, None)
                .await;
            if result.is_success() {
                tracing::info!(worker = worker_name, fallback = %candidate, "recovered via fallback worker");
                result.message = format!("Used {candidate} for {purpose}");
                return result;
            }
            tracing::warn!(fallback = %candidate, error = %result.message, "fallback worker failed");
        }

        let exhausted = HiveError::RecoveryExhausted(worker_name.to_string());
        tracing::warn!(worker = worker_name, error = %exhausted, "fallback cascade exhausted");
        StepResult::success(
            "Handled query with fallback",
            json!({
                "answer": format!(
                    "I'll help you find information about {}. I couldn't access blockchain-specific data, \
                     but I can provide general information.\n\n\
                     Could you tell me more about what you'd like to know, such as company information, \
                     product features, website details or general research?",
                    invocation.input()
                ),
                "module": "fallback_handler",
                "recovery_error": exhausted,
            }),
        )
        .with_worker("fallback_handler")
    }

    /// 其它错误：worker 已给出可读说明则透传，否则让模型改写（失败用模板）
    async fn explain(
        &self,
        worker_name: &str,
        failed: &StepResult,
        invocation: &Invocation,
        sink: Option<&dyn ProgressSink>,
    ) -> StepResult {
        let error_data = failed.data_object();
        let existing = ["answer", "guidance", "user_message"]
            .iter()
            .find_map(|k| error_data.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty());

        if let Some(existing) = existing {
            emit(
                sink,
                ProgressEvent::Error {
                    module: worker_name.to_string(),
                    message: existing.to_string(),
                },
            )
            .await;
            return failed.clone();
        }

        let prompt = format!(
            "Convert this technical error into a helpful user message:\n\
             Module: {worker_name}\n\
             Error: {}\n\
             Original request: {}\n\n\
             Provide a brief, friendly explanation and suggest what the user can do to fix it.\n\
             Keep it concise and actionable.",
            failed.message,
            invocation.input()
        );
        let guidance = match self.model.complete(&[Message::user(prompt)]).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_explanation(worker_name, &failed.message),
            Err(e) => {
                tracing::error!(error = %e, "failed to rewrite error with LLM");
                fallback_explanation(worker_name, &failed.message)
            }
        };

        emit(
            sink,
            ProgressEvent::Error {
                module: worker_name.to_string(),
                message: guidance.clone(),
            },
        )
        .await;

        let mut data = Map::new();
        data.insert("answer".into(), Value::String(guidance));
        data.insert(
            "error_type".into(),
            error_data
                .get("error_type")
                .cloned()
                .unwrap_or_else(|| json!(ErrorClass::Other.error_type())),
        );
        data.insert("original_error".into(), Value::String(failed.message.clone()));
        data.insert("module".into(), Value::String(worker_name.to_string()));
        for (k, v) in error_data {
            data.entry(k).or_insert(v);
        }

        StepResult {
            status: StepStatus::Error,
            message: failed.message.clone(),
            data: Some(Value::Object(data)),
            worker_name: worker_name.to_string(),
            nested_query: None,
        }
    }
}

fn file_guidance(worker_name: &str, message: &str) -> StepResult {
    let filename = capture(filename_pattern(), message)
        .unwrap_or_else(|| "the requested file".to_string());

    StepResult::error("File not found").with_data(json!({
        "answer": format!(
            "I couldn't find {filename}. It may not have been uploaded yet, the name may be misspelled, \
             or it was moved or deleted.\n\n\
             You can upload the file, check the filename and try again, or browse the available files."
        ),
        "error_type": ErrorClass::FileNotFound.error_type(),
        "filename": filename,
        "module": worker_name,
    }))
}

fn fallback_explanation(worker_name: &str, message: &str) -> String {
    format!(
        "The {worker_name} encountered an issue: {message}\n\n\
         Please try checking your input for missing information, rephrasing your request, \
         or using a different approach.\n\n\
         If the problem persists, please contact support."
    )
}
