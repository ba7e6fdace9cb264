//! 分词模块
//!
//! 为对话历史相关度打分提供关键词集合：含 CJK 字符时用 jieba-rs 分词，英文按空格分词，
//! 并去掉常见停用词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 英文停用词：不参与相关度计算
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can", "to",
    "of", "in", "for", "on", "at", "from", "up", "about", "into", "through", "during", "before",
    "after", "above", "below", "between", "under", "again", "further", "then", "once", "here",
    "there", "when", "where", "why", "how", "all", "both", "each", "few", "more", "most", "other",
    "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "and",
    "but", "if", "or", "because", "as", "until", "while", "with", "by", "it", "its", "itself",
    "they", "them", "their", "what", "which", "who", "whom", "this", "that", "these", "those", "i",
    "you", "he", "she", "we", "me", "him", "her", "us", "my", "your", "his", "our", "mine",
    "yours", "ours",
];

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3000}'..='\u{303F}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

/// 判断文本是否包含 CJK 字符
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 智能分词：包含 CJK 时使用 jieba（搜索引擎模式），否则按空白切分；统一转小写
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        text.split_whitespace().map(|s| s.to_lowercase()).collect()
    }
}

/// 关键词集合：分词后去掉停用词
pub fn keyword_set(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set_drops_stop_words() {
        let set = keyword_set("What is the weather in Paris");
        assert!(set.contains("weather"));
        assert!(set.contains("paris"));
        assert!(!set.contains("the"));
        assert!(!set.contains("what"));
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("今天天气怎么样");
        assert!(!tokens.is_empty());
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("   ").is_empty());
    }
}
