//! 上传文件写入知识库
//!
//! 内容为 base64（可带 `data:...;base64,` 前缀）。以 `%PDF` 开头的交给 PdfTextExtractor，
//! 其它按 UTF-8 解码（非法字节替换）。

use std::sync::Arc;

use base64::Engine;
use serde_json::{Map, Value};

use crate::knowledge::{IngestReport, KnowledgeError, KnowledgeStore};

const PDF_MAGIC: &[u8] = b"%PDF";

/// PDF 文本提取能力
pub trait PdfTextExtractor: Send + Sync {
    /// 默认不支持
    fn extract_text(&self, _bytes: &[u8]) -> Result<String, KnowledgeError> {
        Err(KnowledgeError::Unsupported("pdf text extraction"))
    }
}

/// 未接入 PDF 解析时使用
pub struct NoPdfSupport;

impl PdfTextExtractor for NoPdfSupport {}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// 解码 base64 负载，兼容 data URL 前缀与换行
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, KnowledgeError> {
    let body = match payload.find(";base64,") {
        Some(idx) => &payload[idx + ";base64,".len()..],
        None => payload,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| KnowledgeError::Decode(e.to_string()))
}

pub struct FileIngestor {
    store: Arc<KnowledgeStore>,
    pdf: Arc<dyn PdfTextExtractor>,
}

impl FileIngestor {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            pdf: Arc::new(NoPdfSupport),
        }
    }

    pub fn with_pdf_extractor(mut self, pdf: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf = pdf;
        self
    }

    /// 提取文本：PDF 走提取器，其它按 UTF-8
    pub fn extract_text(&self, bytes: &[u8]) -> Result<String, KnowledgeError> {
        if is_pdf(bytes) {
            return self.pdf.extract_text(bytes);
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<IngestReport, KnowledgeError> {
        let text = self.extract_text(bytes)?;
        let mut metadata = Map::new();
        if let Some(name) = filename {
            metadata.insert("filename".into(), Value::String(name.to_string()));
        }
        metadata.insert(
            "ingested_at".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        let report = self.store.ingest_text(None, &text, metadata).await?;
        tracing::info!(
            doc_id = %report.doc_id,
            filename = filename.unwrap_or("-"),
            bytes = bytes.len(),
            "Uploaded file ingested"
        );
        Ok(report)
    }

    pub async fn ingest_base64(
        &self,
        payload: &str,
        filename: Option<&str>,
    ) -> Result<IngestReport, KnowledgeError> {
        let bytes = decode_base64_payload(payload)?;
        self.ingest_bytes(&bytes, filename).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ChunkingConfig, InMemoryGraph};
    use crate::llm::MockEmbedder;

    fn ingestor() -> (FileIngestor, Arc<KnowledgeStore>) {
        let store = Arc::new(
            KnowledgeStore::new(
                Arc::new(InMemoryGraph::new()),
                Arc::new(MockEmbedder::new(8)),
                ChunkingConfig::default(),
            )
            .unwrap(),
        );
        (FileIngestor::new(Arc::clone(&store)), store)
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_decode_accepts_data_url() {
        let payload = format!("data:text/plain;base64,{}", b64(b"hello"));
        assert_eq!(decode_base64_payload(&payload).unwrap(), b"hello");
        assert!(matches!(
            decode_base64_payload("not base64!!"),
            Err(KnowledgeError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_text_upload_is_ingested_with_metadata() {
        let (ingestor, store) = ingestor();
        let report = ingestor
            .ingest_base64(&b64(b"binary trees and heaps"), Some("notes.txt"))
            .await
            .unwrap();
        assert!(report.title.starts_with("Uploaded-"));
        assert_eq!(report.chunk_count, 1);

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs[0].document.metadata["filename"], "notes.txt");
        assert!(docs[0].document.metadata.contains_key("ingested_at"));
    }

    #[tokio::test]
    async fn test_pdf_without_extractor_is_unsupported() {
        let (ingestor, store) = ingestor();
        let err = ingestor
            .ingest_base64(&b64(b"%PDF-1.7 ..."), Some("slides.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Unsupported(_)));
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_pdf_extractor() {
        struct Fixed;
        impl PdfTextExtractor for Fixed {
            fn extract_text(&self, _bytes: &[u8]) -> Result<String, KnowledgeError> {
                Ok("extracted page text".into())
            }
        }
        let (ingestor, _) = ingestor();
        let ingestor = ingestor.with_pdf_extractor(Arc::new(Fixed));
        let report = ingestor.ingest_bytes(b"%PDF-1.4", None).await.unwrap();
        assert_eq!(report.chunk_count, 1);
    }
}
