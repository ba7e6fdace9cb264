//! 历史持久化
//!
//! 将 HistoryStore 导出为单个 JSON 文件，或从文件恢复（可选使用，由 [app].history_file 打开）。

use std::path::Path;

use crate::memory::{HistoryStore, MessageRecord};

/// 简单的文件持久化：单文件 JSON 数组，每条为一条 MessageRecord
#[derive(Debug)]
pub struct HistoryPersistence {
    path: std::path::PathBuf,
}

impl HistoryPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 从 JSON 文件加载记录；文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<MessageRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 加载并回放到 store
    pub fn restore_into(&self, store: &HistoryStore) -> anyhow::Result<usize> {
        let records = self.load()?;
        let n = records.len();
        for record in records {
            store.append(record);
        }
        Ok(n)
    }

    /// 写出 store 的完整快照；父目录不存在时自动创建
    pub fn save(&self, store: &HistoryStore) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&store.snapshot())?)?;
        Ok(())
    }
}
