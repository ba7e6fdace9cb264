//! Hive - Rust 多模块编排系统
//!
//! 入口：初始化日志、加载配置、注册内置 worker，处理命令行参数中的查询；
//! 无参数时逐行读取 stdin。进度事件以 JSON 行写到 stderr，答案写到 stdout。

use std::sync::Arc;

use anyhow::Context as _;
use hive::config::load_config;
use hive::memory::{Context, HistoryPersistence, HistoryStore, Message};
use hive::plan::ProgressEvent;
use hive::workers::EchoWorker;
use hive::{observability, AggregatedResult, Orchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).context("Failed to load config")?;

    let history = Arc::new(HistoryStore::new());
    let persistence = config.app.history_file.as_ref().map(HistoryPersistence::new);
    if let Some(p) = &persistence {
        let n = p.restore_into(&history).context("Failed to restore history")?;
        tracing::info!(records = n, "history restored");
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("{}", event.to_json());
        }
    });

    let default_user = config.app.default_user.clone();
    let orchestrator = Orchestrator::builder(config)
        .register(EchoWorker::default())
        .with_general_worker()
        .with_history(history.clone())
        .with_progress_sink(Arc::new(tx))
        .build();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let context = seed_context(&history, &default_user);
        let result = orchestrator.process_query(args.join(" "), Some(context), false).await;
        print_result(&result);
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            let context = seed_context(&history, &default_user);
            let result = orchestrator.process_query(query, Some(context), false).await;
            print_result(&result);
        }
    }

    if let Some(p) = &persistence {
        p.save(&history).context("Failed to save history")?;
    }

    // 关闭 sink 让打印任务退出
    drop(orchestrator);
    let _ = printer.await;
    Ok(())
}

/// 以该用户已有的历史作为对话上下文（Planner 按 token 预算挑选）
fn seed_context(history: &HistoryStore, user_id: &str) -> Context {
    let messages = history.messages(user_id).iter().map(Message::from).collect();
    Context::new(user_id).with_conversation_history(messages)
}

fn print_result(result: &AggregatedResult) {
    match result.final_answer() {
        Some(answer) if result.is_success() => println!("{}", answer),
        _ => println!("{}", result.message),
    }
}
