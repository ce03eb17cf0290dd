//! 知识图谱（相似度检索层）
//!
//! - **chunker**: 按 token 的重叠分块
//! - **similarity**: 余弦相似度
//! - **types**: Document / Chunk / RetrievalHit
//! - **backend**: 图存储后端（内存 / SQLite）
//! - **store**: KnowledgeStore：写入、检索、基于检索的问答
//! - **ingest**: 上传文件（base64）解码与文本提取

pub mod backend;
pub mod chunker;
pub mod ingest;
pub mod similarity;
pub mod sqlite;
pub mod store;
pub mod types;

use std::sync::Arc;

use thiserror::Error;

use crate::llm::EmbeddingError;

pub use backend::{GraphBackend, InMemoryGraph};
pub use chunker::{chunk_text, ChunkingConfig};
pub use ingest::{FileIngestor, NoPdfSupport, PdfTextExtractor};
pub use similarity::cosine_similarity;
pub use sqlite::SqliteGraph;
pub use store::{KnowledgeStore, QaAnswer};
pub use types::{
    chunk_id, CandidateChunk, Chunk, Document, DocumentSummary, IngestReport, RetrievalHit,
};

#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// 分块参数非法（overlap >= chunk_size）
    #[error("invalid chunking: overlap {chunk_overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunking {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("graph store error: {0}")]
    Storage(String),

    /// 上传内容无法解码
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl KnowledgeError {
    /// 嵌入服务或图存储不可达
    pub fn is_transport(&self) -> bool {
        match self {
            KnowledgeError::Embedding(e) => e.is_transport(),
            KnowledgeError::Storage(_) => true,
            _ => false,
        }
    }
}

/// 按 URI 打开图存储：`memory://` 或 `sqlite://<path>`
pub fn open_backend(uri: &str) -> Result<Arc<dyn GraphBackend>, KnowledgeError> {
    let uri = uri.trim();
    if uri.is_empty() || uri == "memory://" {
        return Ok(Arc::new(InMemoryGraph::new()));
    }
    if let Some(path) = uri.strip_prefix("sqlite://") {
        if path.is_empty() || path == ":memory:" {
            return Ok(Arc::new(SqliteGraph::open_in_memory()?));
        }
        return Ok(Arc::new(SqliteGraph::open(path)?));
    }
    Err(KnowledgeError::Storage(format!("unsupported graph store uri: {uri}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_backend_by_uri() {
        assert!(open_backend("memory://").is_ok());
        assert!(open_backend("sqlite://:memory:").is_ok());
        assert!(matches!(
            open_backend("neo4j://localhost:7687"),
            Err(KnowledgeError::Storage(_))
        ));
    }
}
