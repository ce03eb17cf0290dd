//! Mock LLM / 嵌入客户端（用于测试与无 API Key 的本地运行）
//!
//! MockLlmClient 按队列依次返回预设回复，并记录每次收到的消息；队列为空时回显最后一条 User 消息。
//! MockEmbedder 用哈希词袋生成确定性向量，也可为指定文本固定向量。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{EmbeddingError, EmbeddingProvider, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定的文本回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for r in responses {
            mock.push_response(r);
        }
        mock
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(error));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 n 次调用的全部消息内容拼接（便于断言 prompt）
    pub fn prompt_of(&self, n: usize) -> Option<String> {
        let calls = self.calls.lock().ok()?;
        calls.get(n).map(|msgs| {
            msgs.iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if let Some(next) = self.responses.lock().ok().and_then(|mut q| q.pop_front()) {
            return next;
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 确定性嵌入：固定向量优先，否则按词哈希累加到 `dims` 维
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dims: usize,
    pinned: HashMap<String, Vec<f32>>,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            pinned: HashMap::new(),
        }
    }

    /// 为完全相同的文本固定向量
    pub fn pin(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in token.bytes() {
                hash ^= u64::from(b);
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|t| {
                self.pinned
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| self.bag_of_words(t))
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::with_responses(["first"]);
        let msgs = vec![Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.prompt_of(0).as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::Transport("down".into()));
        let err = mock.complete(&[Message::user("x")]).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_embedder_is_deterministic() {
        let e = MockEmbedder::new(16).pin("q", vec![1.0, 0.0]);
        let a = e.embed(&["alpha beta".to_string(), "q".to_string()]).await.unwrap();
        let b = e.embed(&["alpha beta".to_string()]).await.unwrap();
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], vec![1.0, 0.0]);
        assert_eq!(a[0].iter().sum::<f32>(), 2.0);
    }
}
