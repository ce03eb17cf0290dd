//! 处理器的调用上下文：外部协作方（由组合根注入）+ 本次调用的确认状态

use std::sync::Arc;

use serde_json::Value;

use crate::core::AgentError;
use crate::knowledge::KnowledgeStore;
use crate::llm::LlmClient;
use crate::lms::LmsClient;
use crate::memory::Message;

/// 工具共享的外部服务
pub struct ToolServices {
    pub llm: Arc<dyn LlmClient>,
    pub lms: Arc<dyn LmsClient>,
    pub knowledge: Option<Arc<KnowledgeStore>>,
    /// 出题时检索的分块数
    pub retrieve_top_k: usize,
    /// 问答默认检索的分块数
    pub qa_top_k: usize,
}

impl ToolServices {
    pub fn new(llm: Arc<dyn LlmClient>, lms: Arc<dyn LmsClient>) -> Self {
        Self {
            llm,
            lms,
            knowledge: None,
            retrieve_top_k: 2,
            qa_top_k: 1,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_top_k(mut self, retrieve_top_k: usize, qa_top_k: usize) -> Self {
        self.retrieve_top_k = retrieve_top_k.max(1);
        self.qa_top_k = qa_top_k.max(1);
        self
    }
}

/// 两阶段提交中的确认状态
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Approval {
    /// 首次调用：只生成，不发帖
    #[default]
    Pending,
    /// 用户已确认；draft 为首次调用返回的结果（若有则直接发布，不再重新生成）
    Confirmed { draft: Option<Value> },
}

impl Approval {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Approval::Confirmed { .. })
    }

    pub fn draft(&self) -> Option<&Value> {
        match self {
            Approval::Confirmed { draft } => draft.as_ref(),
            Approval::Pending => None,
        }
    }
}

pub struct ToolContext {
    pub services: Arc<ToolServices>,
    pub approval: Approval,
}

impl ToolContext {
    pub fn new(services: Arc<ToolServices>, approval: Approval) -> Self {
        Self { services, approval }
    }

    /// 结构化生成：JSON 对象原样返回，否则以 fallback_key 包装原文
    pub async fn generate_json(&self, prompt: String, fallback_key: &str) -> Result<Value, AgentError> {
        let structured = self.services.llm.complete_json(&[Message::user(prompt)]).await?;
        Ok(structured.into_object_or(fallback_key))
    }

    /// 纯文本生成
    pub async fn generate_text(&self, prompt: String) -> Result<String, AgentError> {
        let text = self.services.llm.complete(&[Message::user(prompt)]).await?;
        Ok(text.trim().to_string())
    }
}

/// 将任意 JSON 渲染为 prompt 中的文本（字符串不加引号）
pub fn prompt_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "(not provided)".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
