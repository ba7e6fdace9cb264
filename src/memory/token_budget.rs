//! Token 预算控制
//!
//! 规划 prompt 的对话历史按 token 预算挑选：扣除 system prompt、当前查询与回复预留后，
//! 按「近期度 70% + 关键词相关度 30%」打分，优先保留最后两条，最终恢复时间顺序。

use crate::memory::tokenizer::keyword_set;
use crate::memory::Message;

/// 近期度权重
const RECENCY_WEIGHT: f64 = 0.7;
/// 相关度权重
const RELEVANCE_WEIGHT: f64 = 0.3;
/// 超过此 token 数的消息在放不下时允许截断后再尝试
const LONG_MESSAGE_TOKENS: usize = 500;
/// 截断后保留的字符数
const TRUNCATED_CHARS: usize = 1000;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 对话历史挑选器：输入完整历史 + 当前查询 + 预算，输出能放进预算的有序子集
#[derive(Debug, Clone)]
pub struct HistorySelector {
    /// 整个规划请求的 token 上限
    max_tokens: usize,
    /// 为模型回复预留的 token 数
    response_reserve: usize,
}

struct Scored {
    index: usize,
    score: f64,
    tokens: usize,
}

impl HistorySelector {
    pub fn new(max_tokens: usize, response_reserve: usize) -> Self {
        Self {
            max_tokens,
            response_reserve,
        }
    }

    /// 挑选历史消息；prompt_tokens 为 system prompt 已占用的 token 数
    pub fn select(&self, history: &[Message], query: &str, prompt_tokens: usize) -> Vec<Message> {
        if history.is_empty() {
            return Vec::new();
        }

        let reserved = prompt_tokens + TokenEstimator::estimate(query) + self.response_reserve;
        let available = self.max_tokens.saturating_sub(reserved);
        if available == 0 {
            tracing::warn!(
                reserved,
                max_tokens = self.max_tokens,
                "No tokens left for conversation history after prompt and query"
            );
            return Vec::new();
        }

        let query_keywords = keyword_set(query);
        let total = history.len() as f64;
        let mut scored: Vec<Scored> = history
            .iter()
            .enumerate()
            .map(|(index, msg)| {
                let relevance = if query_keywords.is_empty() {
                    0.0
                } else {
                    let msg_keywords = keyword_set(&msg.content);
                    query_keywords.intersection(&msg_keywords).count() as f64
                        / query_keywords.len() as f64
                };
                let recency = (index + 1) as f64 / total;
                Scored {
                    index,
                    score: RECENCY_WEIGHT * recency + RELEVANCE_WEIGHT * relevance,
                    tokens: TokenEstimator::estimate(&msg.content),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut selected: Vec<(usize, Message)> = Vec::new();
        let mut used = 0;

        // 最后两条优先，保证上下文连续
        for index in history.len().saturating_sub(2)..history.len() {
            let tokens = TokenEstimator::estimate(&history[index].content);
            if used + tokens <= available {
                selected.push((index, history[index].clone()));
                used += tokens;
            }
        }

        for candidate in scored {
            if selected.iter().any(|(i, _)| *i == candidate.index) {
                continue;
            }
            if used + candidate.tokens > available {
                if candidate.tokens > LONG_MESSAGE_TOKENS && selected.len() < 3 {
                    let original = &history[candidate.index];
                    let truncated = truncate_chars(&original.content, TRUNCATED_CHARS);
                    let tokens = TokenEstimator::estimate(&truncated);
                    if used + tokens <= available {
                        selected.push((
                            candidate.index,
                            Message {
                                role: original.role.clone(),
                                content: truncated,
                            },
                        ));
                        used += tokens;
                    }
                }
                continue;
            }
            selected.push((candidate.index, history[candidate.index].clone()));
            used += candidate.tokens;
        }

        selected.sort_by_key(|(i, _)| *i);
        tracing::info!(
            messages = selected.len(),
            history_tokens = used,
            total_tokens = reserved + used,
            "Conversation context selected"
        );
        selected.into_iter().map(|(_, m)| m).collect()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}... [truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_token_estimator_chinese() {
        assert!(TokenEstimator::estimate("你好世界，这是一个测试。") > 0);
    }

    #[test]
    fn test_select_empty_history() {
        let selector = HistorySelector::new(10_000, 2000);
        assert!(selector.select(&[], "hi", 100).is_empty());
    }

    #[test]
    fn test_select_no_budget_left() {
        let selector = HistorySelector::new(1000, 2000);
        let history = vec![Message::user("hello"), Message::assistant("hi there")];
        assert!(selector.select(&history, "next", 10).is_empty());
    }

    #[test]
    fn test_select_keeps_chronological_order() {
        let selector = HistorySelector::new(10_000, 2000);
        let history = vec![
            Message::user("tell me about rust"),
            Message::assistant("rust is a systems language"),
            Message::user("and python?"),
            Message::assistant("python is dynamic"),
        ];
        let selected = selector.select(&history, "more about rust", 100);
        assert_eq!(selected, history);
    }

    #[test]
    fn test_select_truncates_long_message() {
        // 可用预算 = 3000 - (10 + 1 + 2000) ≈ 989
        let selector = HistorySelector::new(3000, 2000);
        let long = "word ".repeat(2000);
        let history = vec![Message::user(long), Message::user("short")];
        let selected = selector.select(&history, "q", 10);
        assert_eq!(selected.len(), 2);
        assert!(selected[0].content.ends_with("... [truncated]"));
        assert_eq!(selected[1].content, "short");
    }
}
