//! 图存储后端：文档节点、分块节点与包含关系（按 position）
//!
//! 后端自身保证并发写入与检索互不交错：内存实现用 RwLock，SQLite 实现每次写入一个事务。

use std::sync::RwLock;

use async_trait::async_trait;

use crate::knowledge::{CandidateChunk, Chunk, Document, DocumentSummary, KnowledgeError};

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// 写入文档及其全部分块（upsert）。
    ///
    /// 已存在的 doc_id 更新 title / metadata，保留 created_at；
    /// position 不小于新分块数的旧分块一并删除。
    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<(), KnowledgeError>;

    /// 按存储顺序（文档写入顺序，再按 position）返回候选分块，可选上限
    async fn fetch_candidates(&self, limit: Option<usize>) -> Result<Vec<CandidateChunk>, KnowledgeError>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KnowledgeError>;
}

/// 内存图存储（进程内共享，重启丢失）
#[derive(Default)]
pub struct InMemoryGraph {
    documents: RwLock<Vec<(Document, Vec<Chunk>)>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> KnowledgeError {
    KnowledgeError::Storage("graph lock poisoned".to_string())
}

#[async_trait]
impl GraphBackend for InMemoryGraph {
    async fn upsert_document(&self, document: &Document, chunks: &[Chunk]) -> Result<(), KnowledgeError> {
        let mut docs = self.documents.write().map_err(poisoned)?;
        match docs.iter_mut().find(|(d, _)| d.doc_id == document.doc_id) {
            Some((existing, existing_chunks)) => {
                existing.title = document.title.clone();
                existing.metadata = document.metadata.clone();
                *existing_chunks = chunks.to_vec();
            }
            None => docs.push((document.clone(), chunks.to_vec())),
        }
        Ok(())
    }

    async fn fetch_candidates(&self, limit: Option<usize>) -> Result<Vec<CandidateChunk>, KnowledgeError> {
        let docs = self.documents.read().map_err(poisoned)?;
        let all = docs.iter().flat_map(|(doc, chunks)| {
            chunks.iter().map(move |c| CandidateChunk {
                chunk: c.clone(),
                document: doc.clone(),
            })
        });
        Ok(match limit {
            Some(n) => all.take(n).collect(),
            None => all.collect(),
        })
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KnowledgeError> {
        let docs = self.documents.read().map_err(poisoned)?;
        Ok(docs
            .iter()
            .map(|(doc, chunks)| DocumentSummary {
                document: doc.clone(),
                chunk_count: chunks.len(),
            })
            .collect())
    }
}
