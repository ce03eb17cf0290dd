//! 嵌入 API：供知识图谱的分块向量化使用，调用 OpenAI 兼容的 /embeddings 端点
//!
//! 向量维度由服务决定，进程生命周期内视为常量。

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    /// 连接失败、超时等传输层错误
    #[error("embedding transport error: {0}")]
    Transport(String),

    #[error("embedding service error: {0}")]
    Service(String),

    /// 返回条数与输入不一致
    #[error("embedding count mismatch: expected {expected}, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

impl EmbeddingError {
    pub fn is_transport(&self) -> bool {
        matches!(self, EmbeddingError::Transport(_))
    }
}

impl From<OpenAIError> for EmbeddingError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => EmbeddingError::Transport(e.to_string()),
            other => EmbeddingError::Service(other.to_string()),
        }
    }
}

/// 嵌入提供方：批量将文本编码为定长向量，输出顺序与输入一致
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// 编码单条文本
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            got: 0,
        })
    }

    fn model_name(&self) -> &str;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// 从环境变量与可选 base_url 创建（与 LLM 共用 OPENAI_API_KEY）
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;
        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: data.len(),
            });
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// 从应用配置创建嵌入提供方；未配置 API Key 时返回 None
pub fn create_embedder_from_config(
    base_url: Option<&str>,
    model: &str,
    api_key: Option<&str>,
) -> Option<Arc<dyn EmbeddingProvider>> {
    let key = api_key
        .map(String::from)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if key.as_deref().unwrap_or("").is_empty() || key.as_deref() == Some("sk-placeholder") {
        tracing::debug!("embedding skipped: no OPENAI_API_KEY");
        return None;
    }
    Some(Arc::new(OpenAiEmbedder::new(base_url, model, key.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transport() {
        let e: EmbeddingError = OpenAIError::InvalidArgument("model is required".into()).into();
        assert!(matches!(e, EmbeddingError::Service(_)));
        assert!(!e.is_transport());
        assert!(EmbeddingError::Transport("connection refused".into()).is_transport());
        assert!(!EmbeddingError::CountMismatch { expected: 2, got: 1 }.is_transport());
    }
}
