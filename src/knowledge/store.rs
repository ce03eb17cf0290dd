//! KnowledgeStore：全局共享的知识库
//!
//! 写入：分块 → 批量嵌入 → 后端 upsert（文档 + 分块）。
//! 检索：嵌入查询 → 取候选 → 余弦打分 → 稳定降序排序 → top_k。
//! 问答：检索结果的标题与分数作为上下文交给文本生成服务；任何失败都只返回检索结果，不向调用方抛错。

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::knowledge::{
    chunk_text, cosine_similarity, Chunk, ChunkingConfig, Document, DocumentSummary,
    GraphBackend, IngestReport, KnowledgeError, RetrievalHit,
};
use crate::llm::{EmbeddingError, EmbeddingProvider, LlmClient, Structured};
use crate::memory::Message;

/// 问答结果；无论成功与否都携带检索命中
#[derive(Debug, Clone, Default, Serialize)]
pub struct QaAnswer {
    /// 未调用或调用失败时为 None
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub context_hits: Vec<RetrievalHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct KnowledgeStore {
    backend: Arc<dyn GraphBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Option<Arc<dyn LlmClient>>,
    chunking: ChunkingConfig,
    candidate_limit: Option<usize>,
}

impl KnowledgeStore {
    pub fn new(
        backend: Arc<dyn GraphBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self, KnowledgeError> {
        chunking.validate()?;
        Ok(Self {
            backend,
            embedder,
            llm: None,
            chunking,
            candidate_limit: None,
        })
    }

    /// 设置问答使用的文本生成服务
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 调用方未指定时使用的候选分块上限
    pub fn with_candidate_limit(mut self, limit: Option<usize>) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// 写入文档：分块、嵌入并 upsert；同一 doc_id 再次写入会更新标题与元数据并重建分块
    pub async fn add_document(
        &self,
        doc_id: &str,
        title: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<IngestReport, KnowledgeError> {
        let pieces = chunk_text(text, &self.chunking)?;
        let embeddings = if pieces.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&pieces).await?
        };
        if embeddings.len() != pieces.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: pieces.len(),
                got: embeddings.len(),
            }
            .into());
        }

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(pos, (text, emb))| Chunk::new(doc_id, pos, text, emb))
            .collect();

        let document = Document::new(doc_id, title, metadata);
        self.backend.upsert_document(&document, &chunks).await?;
        tracing::info!(doc_id, title, chunks = chunks.len(), "Document ingested");

        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            title: title.to_string(),
            chunk_count: chunks.len(),
        })
    }

    /// 以新生成的 UUID 写入文本；未给标题时使用 `Uploaded-<id 前 8 位>`
    pub async fn ingest_text(
        &self,
        title: Option<&str>,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<IngestReport, KnowledgeError> {
        let doc_id = uuid::Uuid::new_v4().to_string();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("Uploaded-{}", &doc_id[..8]));
        self.add_document(&doc_id, &title, text, metadata).await
    }

    /// 检索与 query 最相似的 top_k 个分块（分数不增，同分保持存储顺序）
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        candidate_limit: Option<usize>,
    ) -> Result<Vec<RetrievalHit>, KnowledgeError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;
        let candidates = self
            .backend
            .fetch_candidates(candidate_limit.or(self.candidate_limit))
            .await?;

        let mut scored: Vec<(f32, _)> = candidates
            .into_iter()
            .map(|c| (cosine_similarity(&query_vec, &c.chunk.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        let hits: Vec<RetrievalHit> = scored
            .into_iter()
            .map(|(score, c)| RetrievalHit::from_candidate(c, score))
            .collect();
        tracing::debug!(query, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }

    /// 基于检索的问答，永不返回错误：检索失败时 context_hits 为空并写入 error
    pub async fn answer_question(&self, question: &str, top_k: usize, use_llm: bool) -> QaAnswer {
        let hits = match self.retrieve(question, top_k, None).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed for question");
                return QaAnswer {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let llm = match (&self.llm, use_llm) {
            (Some(llm), true) => Arc::clone(llm),
            _ => {
                return QaAnswer {
                    message: Some("No generation service available; returning retrieved context only.".into()),
                    context_hits: hits,
                    ..Default::default()
                }
            }
        };

        let context_text = hits
            .iter()
            .map(|h| format!("[Document: {}] (score={:.4})", h.doc_title, h.score))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are an assistant answering a question using ONLY the retrieved sources listed below.\n\
             Do not include the chunk text in your answer. Answer in at most 3 sentences.\n\n\
             Retrieved Sources:\n{context_text}\n\n\
             Question: {question}\n\n\
             Return output ONLY in this JSON format:\n\
             {{\"answer\": \"<short answer>\", \"sources\": [\"document name\"]}}"
        );

        match llm.complete_json(&[Message::user(prompt)]).await {
            Ok(Structured::Parsed(Value::Object(obj))) => QaAnswer {
                answer: obj.get("answer").map(value_text),
                sources: obj
                    .get("sources")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().map(value_text).collect())
                    .unwrap_or_else(|| titles(&hits)),
                context_hits: hits,
                ..Default::default()
            },
            Ok(other) => {
                let raw = match other {
                    Structured::Fallback(text) => text,
                    Structured::Parsed(v) => value_text(&v),
                };
                tracing::warn!("Q&A answer is not a JSON object, echoing retrieved titles as sources");
                QaAnswer {
                    answer: Some(raw),
                    sources: titles(&hits),
                    context_hits: hits,
                    ..Default::default()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Q&A generation failed, returning retrieved context only");
                QaAnswer {
                    error: Some(e.to_string()),
                    context_hits: hits,
                    ..Default::default()
                }
            }
        }
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KnowledgeError> {
        self.backend.list_documents().await
    }
}

fn titles(hits: &[RetrievalHit]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for h in hits {
        if !out.contains(&h.doc_title) {
            out.push(h.doc_title.clone());
        }
    }
    out
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryGraph;
    use crate::llm::{LlmError, MockEmbedder, MockLlmClient};
    use serde_json::json;

    fn store_with(embedder: MockEmbedder) -> KnowledgeStore {
        KnowledgeStore::new(
            Arc::new(InMemoryGraph::new()),
            Arc::new(embedder),
            ChunkingConfig::new(3, 0).unwrap(),
        )
        .unwrap()
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_add_document_chunks_600_words_into_two() {
        let store = KnowledgeStore::new(
            Arc::new(InMemoryGraph::new()),
            Arc::new(MockEmbedder::new(16)),
            ChunkingConfig::default(),
        )
        .unwrap();
        let report = store
            .add_document("d1", "Chapter 1", &words(600), Map::new())
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 2);
        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs[0].chunk_count, 2);
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_score_and_caps_top_k() {
        let embedder = MockEmbedder::new(4)
            .pin("a0 a1 a2", vec![1.0, 0.0, 0.0, 0.0])
            .pin("b0 b1 b2", vec![0.0, 1.0, 0.0, 0.0])
            .pin("c0 c1 c2", vec![0.9, 0.1, 0.0, 0.0])
            .pin("d0 d1 d2", vec![0.0, 0.0, 1.0, 0.0])
            .pin("e0 e1 e2", vec![0.0, 0.0, 0.0, 0.0])
            .pin("query", vec![1.0, 0.0, 0.0, 0.0]);
        let store = store_with(embedder);
        store
            .add_document("d", "Doc", "a0 a1 a2 b0 b1 b2 c0 c1 c2 d0 d1 d2 e0 e1 e2", Map::new())
            .await
            .unwrap();

        let hits = store.retrieve("query", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "d::chunk::0");
        assert_eq!(hits[1].chunk_id, "d::chunk::2");
        assert!(hits[0].score >= hits[1].score);

        let all = store.retrieve("query", 10, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_nan_embedding_ranks_last() {
        let embedder = MockEmbedder::new(2)
            .pin("n0 n1 n2", vec![f32::NAN, 1.0])
            .pin("p0 p1 p2", vec![1.0, 0.5])
            .pin("q", vec![1.0, 0.0]);
        let store = store_with(embedder);
        store
            .add_document("n", "N", "n0 n1 n2 p0 p1 p2", Map::new())
            .await
            .unwrap();
        let hits = store.retrieve("q", 2, None).await.unwrap();
        assert_eq!(hits[0].chunk_id, "n::chunk::1");
        assert_eq!(hits[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_ties_keep_storage_order() {
        let v = vec![1.0, 1.0];
        let embedder = MockEmbedder::new(2)
            .pin("x0 x1 x2", v.clone())
            .pin("y0 y1 y2", v.clone())
            .pin("q", v);
        let store = store_with(embedder);
        store
            .add_document("t", "T", "x0 x1 x2 y0 y1 y2", Map::new())
            .await
            .unwrap();
        let hits = store.retrieve("q", 2, None).await.unwrap();
        assert_eq!(hits[0].chunk_id, "t::chunk::0");
        assert_eq!(hits[1].chunk_id, "t::chunk::1");
    }

    #[tokio::test]
    async fn test_answer_question_parses_json() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"answer": "Recursion calls itself.", "sources": ["Chapter 3"]}"#,
        ]));
        let store = store_with(MockEmbedder::new(8)).with_llm(llm.clone());
        let mut meta = Map::new();
        meta.insert("course".into(), json!("CS101"));
        store
            .add_document("c3", "Chapter 3", "recursion calls itself", meta)
            .await
            .unwrap();

        let qa = store.answer_question("what is recursion", 1, true).await;
        assert_eq!(qa.answer.as_deref(), Some("Recursion calls itself."));
        assert_eq!(qa.sources, vec!["Chapter 3"]);
        assert_eq!(qa.context_hits.len(), 1);
        assert_eq!(qa.context_hits[0].course.as_deref(), Some("CS101"));

        let prompt = llm.prompt_of(0).unwrap();
        assert!(prompt.contains("[Document: Chapter 3] (score="));
        assert!(!prompt.contains("calls itself"));
    }

    #[tokio::test]
    async fn test_answer_question_fallbacks() {
        let llm = Arc::new(MockLlmClient::with_responses(["just some prose"]));
        llm.push_error(LlmError::Transport("timeout".into()));
        let store = store_with(MockEmbedder::new(8)).with_llm(llm);
        store
            .add_document("g", "Graphs", "nodes and edges", Map::new())
            .await
            .unwrap();

        let prose = store.answer_question("graphs?", 1, true).await;
        assert_eq!(prose.answer.as_deref(), Some("just some prose"));
        assert_eq!(prose.sources, vec!["Graphs"]);

        let failed = store.answer_question("graphs?", 1, true).await;
        assert!(failed.answer.is_none());
        assert!(failed.error.is_some());
        assert_eq!(failed.context_hits.len(), 1);

        let no_llm = store.answer_question("graphs?", 1, false).await;
        assert!(no_llm.answer.is_none());
        assert!(no_llm.message.is_some());
        assert_eq!(no_llm.context_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_text_generates_title() {
        let store = store_with(MockEmbedder::new(8));
        let report = store.ingest_text(None, "hello world", Map::new()).await.unwrap();
        assert_eq!(report.title, format!("Uploaded-{}", &report.doc_id[..8]));
    }
}
