//! Agent 错误类型
//!
//! 编排器把工具派发中的 Err 转为 ERROR 终态；LLM 输出格式错误不在此列（由 `Structured::Fallback` 处理）。

use thiserror::Error;

use crate::knowledge::KnowledgeError;
use crate::llm::LlmError;
use crate::lms::LmsError;

/// Agent 运行过程中可能出现的错误（传输、解析、工具、参数、配置等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 外部协作方超时或连接失败
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 意图指向未注册的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool}: {reason}")]
    InvalidParameters { tool: String, reason: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Lms(#[from] LmsError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

impl AgentError {
    pub fn invalid_params(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::InvalidParameters {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        match self {
            AgentError::Transport(_) | AgentError::ToolTimeout(_) => true,
            AgentError::Lms(e) => e.is_transport(),
            AgentError::Knowledge(e) => e.is_transport(),
            _ => false,
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Transport(msg) => AgentError::Transport(msg),
            other => AgentError::LlmError(other.to_string()),
        }
    }
}
