//! 流式事件：把编排结果分解为固定顺序的类型化事件（NDJSON / SSE 友好）
//!
//! 顺序：status → thought → action（仅执行了工具时）→ answer_chunk* → 终止事件。
//! 终止事件恰好一个：confirmation_required、error 或 complete。消费方遇到终止事件即停止。

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::core::AgentOutcome;

/// 回复分块的目标字符数
const CHUNK_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueEvent {
    /// 处理阶段提示
    Status { message: String },
    /// 意图识别结果（置信度仅供展示）
    Thought {
        intent: String,
        confidence: Option<f64>,
        missing_parameters: Vec<String>,
    },
    /// 已派发的工具
    Action { tool: String },
    /// 回复的一小段
    AnswerChunk { text: String },
    /// 草稿已生成，等待 `/confirm-action`
    ConfirmationRequired { intent: String, draft: Value },
    Error { text: String },
    /// 终止
    Complete { status: String, details: Value },
}

impl DialogueEvent {
    pub fn status(message: impl Into<String>) -> Self {
        DialogueEvent::Status {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DialogueEvent::ConfirmationRequired { .. }
                | DialogueEvent::Error { .. }
                | DialogueEvent::Complete { .. }
        )
    }

    /// 单行 JSON（NDJSON 行，不含换行符）
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","text":"event serialization failed: {e}"}}"#)
        })
    }
}

/// 按词边界把文本切成若干段，拼接后与原文一致
pub fn split_chunks(text: &str, target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in text.split_inclusive(char::is_whitespace) {
        current.push_str(piece);
        if current.chars().count() >= target {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// 编排结果 → 事件序列（不含开头的 status，由调用方在识别前先发出）
pub fn outcome_events(outcome: &AgentOutcome) -> Vec<DialogueEvent> {
    let mut events = Vec::new();
    let (confidence, missing) = match outcome {
        AgentOutcome::Incomplete {
            missing_parameters, ..
        } => (None, missing_parameters.clone()),
        AgentOutcome::Success { confidence, .. } => (Some(*confidence), Vec::new()),
        AgentOutcome::Error { .. } => (None, Vec::new()),
    };
    events.push(DialogueEvent::Thought {
        intent: outcome.intent().to_string(),
        confidence,
        missing_parameters: missing,
    });

    match outcome {
        AgentOutcome::Error { error, intent } => {
            if intent != crate::dialogue::ERROR_INTENT {
                events.push(DialogueEvent::Action { tool: intent.clone() });
            }
            events.push(DialogueEvent::Error { text: error.clone() });
        }
        AgentOutcome::Success { intent, result, .. } => {
            events.push(DialogueEvent::Action { tool: intent.clone() });
            events.extend(reply_chunks(outcome));
            if outcome.requires_confirmation() {
                events.push(DialogueEvent::ConfirmationRequired {
                    intent: intent.clone(),
                    draft: result.clone(),
                });
            } else {
                events.push(complete(outcome));
            }
        }
        AgentOutcome::Incomplete { .. } => {
            events.extend(reply_chunks(outcome));
            events.push(complete(outcome));
        }
    }
    events
}

fn reply_chunks(outcome: &AgentOutcome) -> impl Iterator<Item = DialogueEvent> {
    split_chunks(&outcome.reply(), CHUNK_CHARS)
        .into_iter()
        .map(|text| DialogueEvent::AnswerChunk { text })
}

fn complete(outcome: &AgentOutcome) -> DialogueEvent {
    DialogueEvent::Complete {
        status: outcome.status().to_string(),
        details: serde_json::to_value(outcome).unwrap_or(Value::Object(Map::new())),
    }
}

/// 事件发送端；接收端关闭（客户端断开）后 `emit` 返回 false，调用方应停止后续处理
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<DialogueEvent>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<DialogueEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<DialogueEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn emit(&self, event: DialogueEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Event stream closed by consumer");
            return false;
        }
        true
    }

    /// 依次发送，遇到关闭立即停止
    pub async fn emit_all(&self, events: impl IntoIterator<Item = DialogueEvent>) -> bool {
        for event in events {
            if !self.emit(event).await {
                return false;
            }
        }
        true
    }
}
