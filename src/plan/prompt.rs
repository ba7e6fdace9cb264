//! 规划 prompt：能力目录、使用规则、计划 JSON Schema 与带历史时的格式强化消息

use schemars::JsonSchema;
use serde::Deserialize;

use crate::workers::{WorkerKind, WorkerSummary};

/// 模型输出的计划文档（只用于生成 Schema 与宽松解析）
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PlanDocument {
    /// Your reasoning about how to handle the query
    #[serde(default)]
    pub thought_process: String,
    /// Human-readable steps, in order
    #[serde(default)]
    pub plan: Vec<String>,
    /// Ordered worker calls; MUST NOT be empty
    #[serde(default)]
    pub module_calls: Vec<PlanCall>,
}

/// 单个调用：模块用 module/query，集成用 integration/command
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PlanCall {
    Module {
        module: String,
        query: String,
        #[serde(default)]
        reason: String,
    },
    Integration {
        integration: String,
        command: String,
        #[serde(default)]
        reason: String,
    },
}

pub fn plan_schema() -> String {
    let schema = schemars::schema_for!(PlanDocument);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

fn render_catalogue(catalogue: &[WorkerSummary], kind: WorkerKind) -> String {
    let entries: Vec<String> = catalogue
        .iter()
        .filter(|w| w.kind == kind)
        .map(|w| {
            let caps = &w.capabilities;
            format!(
                "\n{}:\nDescription: {}\nCapabilities: {}\nExample queries: {}",
                w.name,
                caps.description,
                caps.capabilities.join(", "),
                caps.example_queries.join(", ")
            )
        })
        .collect();
    if entries.is_empty() {
        "\n(none)".to_string()
    } else {
        entries.concat()
    }
}

/// 固定的 system 指令（注册表建好后生成一次）
pub fn system_prompt(catalogue: &[WorkerSummary], general_worker: &str) -> String {
    format!(
        r#"You are a master agent that coordinates specialized modules and integrations to complete tasks.

Available modules and their capabilities:
{modules}

Available integrations:
{integrations}

PREVIOUS MESSAGE REFERENCES:
Queries may already contain placeholders such as [previous_message data], [author_agent data],
[browser_agent data] or [deepresearch_agent data]. The referenced content is ALREADY in the context.
Pass these placeholders through to the modules; never ask the user for that content.

Your job is to:
1. Analyze the user's query and break it into sequential steps
2. Pick the appropriate module or integration for each step
3. Order the calls so each step can use the output of the previous one

RULES:
- Select modules from the CURRENT query content, not from conversation history alone
- For greetings and other conversational queries ALWAYS use {general}
- If unsure which module to use, default to {general}
- When a later call needs an earlier result, reference it with a source-specific placeholder
  like "[author_agent data]" or "[browser_agent results]", never a generic "[extracted_data]"
- Combine consecutive steps for the same module into one call unless another module must run in between
- Preserve file names, paths and URLs exactly as given

You must ALWAYS respond with a single valid JSON object and nothing else.
It must validate against this JSON Schema:
{schema}

Example:
{{"thought_process": "User is greeting me", "plan": ["Respond to the greeting"], "module_calls": [{{"module": "{general}", "query": "hello, how are you", "reason": "Conversational query"}}]}}

CRITICAL: module_calls MUST NOT be empty."#,
        modules = render_catalogue(catalogue, WorkerKind::Module),
        integrations = render_catalogue(catalogue, WorkerKind::Integration),
        general = general_worker,
        schema = plan_schema(),
    )
}

/// 带历史时追加在当前查询之后
pub const REINFORCEMENT: &str = r#"CRITICAL REMINDER:
1. When the user refers to earlier messages ("send this", "use your last answer"), take the EXACT content
   from the conversation history and include it in full in the module query. Do not generate new content.
2. Respond ONLY with a JSON object of the form
   {"thought_process": "...", "plan": ["Step 1", ...], "module_calls": [{"module": "...", "query": "...", "reason": "..."}]}
Do not provide a conversational response."#;
