//! 文档分块：按空白切分 token，生成重叠窗口
//!
//! 窗口长度 `chunk_size`，每步前进 `chunk_size - chunk_overlap` 个 token；最后一块可以更短。
//! 窗口已覆盖到文本末尾时停止，不再产生完全被上一块包含的尾块。

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeError;

/// 分块参数（单位：token）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, KnowledgeError> {
        let cfg = Self {
            chunk_size,
            chunk_overlap,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// overlap 必须小于 chunk_size，否则步长为 0 无法前进
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(KnowledgeError::InvalidChunking {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// 将文本切分为重叠的 token 窗口，每块以单个空格连接
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, KnowledgeError> {
    config.validate()?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + config.chunk_size).min(tokens.len());
        chunks.push(tokens[start..end].join(" "));
        if end == tokens.len() {
            break;
        }
        start += config.step();
    }
    Ok(chunks)
}
