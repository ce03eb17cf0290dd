//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（文本）、complete_json（结构化 JSON）。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::structured::{parse_structured, Structured};
use crate::memory::Message;

/// 结构化输出时追加的 system 指令
pub const JSON_ONLY_INSTRUCTION: &str =
    "Respond with a single valid JSON object only. Do not wrap it in prose.";

/// 文本生成服务错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 超时、连接失败等传输层错误（由编排器转为 ERROR 终态）
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    pub fn is_transport(&self) -> bool {
        matches!(self, LlmError::Transport(_))
    }
}

/// LLM 客户端 trait：文本完成与结构化 JSON 完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 文本完成，返回首条回复内容
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 结构化完成：要求单个 JSON 对象，解析失败时给出 `Structured::Fallback` 而不是错误
    async fn complete_json(&self, messages: &[Message]) -> Result<Structured, LlmError> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        full.push(Message::system(JSON_ONLY_INSTRUCTION));
        full.extend_from_slice(messages);
        let raw = self.complete(&full).await?;
        Ok(parse_structured(&raw))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
