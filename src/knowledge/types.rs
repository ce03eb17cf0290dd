//! 知识图谱数据类型：Document 1—* Chunk，检索结果 RetrievalHit

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 文档节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// 首次写入时间（RFC 3339），重复写入同一 doc_id 时保持不变
    pub created_at: String,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, title: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            doc_id: doc_id.into(),
            title: title.into(),
            metadata,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn meta_str(&self, key: &str) -> Option<String> {
        self.metadata.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    }
}

/// 分块 ID：由 doc_id 与位置确定，同一 (doc_id, position) 始终一致
pub fn chunk_id(doc_id: &str, position: usize) -> String {
    format!("{doc_id}::chunk::{position}")
}

/// 分块节点（归属其文档，按 position 排序）
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub position: usize,
}

impl Chunk {
    pub fn new(doc_id: &str, position: usize, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk_id(doc_id, position),
            text: text.into(),
            embedding,
            position,
        }
    }
}

/// 候选分块：分块连同所属文档信息，按后端存储顺序返回
#[derive(Debug, Clone)]
pub struct CandidateChunk {
    pub chunk: Chunk,
    pub document: Document,
}

/// 单条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: String,
    /// 余弦相似度，范围 [-1, 1]
    pub score: f32,
    pub text: String,
    pub chapter: Option<String>,
    pub course: Option<String>,
    pub doc_title: String,
}

impl RetrievalHit {
    pub fn from_candidate(candidate: CandidateChunk, score: f32) -> Self {
        let CandidateChunk { chunk, document } = candidate;
        Self {
            chunk_id: chunk.chunk_id,
            score,
            text: chunk.text,
            chapter: document.meta_str("chapter"),
            course: document.meta_str("course"),
            doc_title: document.title,
        }
    }
}

/// 文档列表项
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    #[serde(flatten)]
    pub document: Document,
    pub chunk_count: usize,
}

/// 写入结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub title: String,
    pub chunk_count: usize,
}
