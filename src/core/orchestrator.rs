//! 对话编排器：意图识别 → 完整性分支 → 工具派发 → 记忆写入 → 统一结果信封
//!
//! 每次调用（`handle` 或 `confirm`）恰好写入一次会话记忆，并产生恰好一个终态：
//! Incomplete（缺参数，追问）、Success（工具已执行）、Error（识别失败或工具派发出错）。
//! 编排器从不自动重试。需要发帖的工具先返回草稿，由 `confirm` 携带确认标志再次执行。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dialogue::{IntentDecision, IntentResolver, RequestHints};
use crate::llm::LlmClient;
use crate::memory::ConversationMemory;
use crate::tools::{Approval, ToolExecutor, ToolRegistry};

/// 结果摘要写入记忆时的最大字符数
const SUMMARY_MAX_CHARS: usize = 500;

/// 单个会话：对话记忆 + 待确认动作（会话之间互不共享）
#[derive(Debug)]
pub struct Session {
    pub memory: ConversationMemory,
    pub pending: Option<PendingAction>,
}

impl Session {
    pub fn new(max_turns: usize) -> Self {
        Self {
            memory: ConversationMemory::new(max_turns),
            pending: None,
        }
    }

    /// 清空记忆并丢弃待确认动作
    pub fn clear(&mut self) {
        self.memory.clear();
        self.pending = None;
    }
}

/// 已生成、等待确认的副作用动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub intent: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// 首次执行返回的草稿（确认时原样发布）
    #[serde(default, alias = "result")]
    pub draft: Value,
}

/// `/confirm-action` 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Confirmation {
    pub confirmed: bool,
    /// 缺省时使用会话中记住的待确认动作
    #[serde(default)]
    pub original_request: Option<PendingAction>,
}

/// 编排器的终态信封
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentOutcome {
    Incomplete {
        intent: String,
        missing_parameters: Vec<String>,
        clarification_question: String,
    },
    Success {
        intent: String,
        result: Value,
        confidence: f64,
    },
    Error {
        intent: String,
        error: String,
    },
}

impl AgentOutcome {
    pub fn intent(&self) -> &str {
        match self {
            AgentOutcome::Incomplete { intent, .. }
            | AgentOutcome::Success { intent, .. }
            | AgentOutcome::Error { intent, .. } => intent,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            AgentOutcome::Incomplete { .. } => "incomplete",
            AgentOutcome::Success { .. } => "success",
            AgentOutcome::Error { .. } => "error",
        }
    }

    /// 成功结果是否仍需用户确认（两阶段提交的第一阶段）
    pub fn requires_confirmation(&self) -> bool {
        match self {
            AgentOutcome::Success { result, .. } => result
                .get("requires_confirmation")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// 面向用户的可读回复
    pub fn reply(&self) -> String {
        match self {
            AgentOutcome::Incomplete {
                clarification_question,
                ..
            } => clarification_question.clone(),
            AgentOutcome::Success { intent, result, .. } => {
                let body = render_result(result);
                if self.requires_confirmation() {
                    format!("I've prepared the {} draft below. Confirm to publish it, or tell me what to change.\n\n{body}", label(intent))
                } else if let Some(err) = result.get("error").and_then(Value::as_str) {
                    format!("I've executed {} but part of it failed: {err}\n\n{body}", label(intent))
                } else {
                    format!("I've executed {}.\n\n{body}", label(intent))
                }
            }
            AgentOutcome::Error { error, .. } => {
                format!("Sorry, I encountered an error: {error}")
            }
        }
    }
}

fn label(intent: &str) -> String {
    intent.replace('_', " ")
}

/// 结果中的纯文本字段直接展示，其余序列化为缩进 JSON
fn render_result(result: &Value) -> String {
    const TEXT_KEYS: &[&str] = &["answer", "announcement", "reminder", "feedback", "raw_output"];
    if let Some(text) = TEXT_KEYS
        .iter()
        .find_map(|k| result.get(*k).and_then(Value::as_str))
    {
        return text.to_string();
    }
    match result {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

pub struct DialogueOrchestrator {
    resolver: IntentResolver,
    executor: Arc<ToolExecutor>,
}

impl DialogueOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            resolver: IntentResolver::new(llm),
            executor,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// 处理一条用户输入
    pub async fn handle(&self, session: &mut Session, utterance: &str, hints: &RequestHints) -> AgentOutcome {
        let context = session.memory.get_context();
        let decision = self
            .resolver
            .resolve_with_hints(utterance, &context, self.registry(), hints)
            .await;
        // 新的输入使之前未确认的草稿失效
        session.pending = None;

        let parameters = decision.parameters.clone();
        let outcome = self.decide(decision).await;
        if let AgentOutcome::Success {
            intent, result, ..
        } = &outcome
        {
            if outcome.requires_confirmation() {
                session.pending = Some(PendingAction {
                    intent: intent.clone(),
                    parameters,
                    draft: result.clone(),
                });
            }
        }
        session.memory.add(utterance, memory_summary(&outcome));
        tracing::info!(status = outcome.status(), intent = %outcome.intent(), "Utterance handled");
        outcome
    }

    async fn decide(&self, decision: IntentDecision) -> AgentOutcome {
        if decision.is_error() {
            return AgentOutcome::Error {
                intent: decision.intent,
                error: "I could not work out what you want me to do. Could you rephrase the request?".into(),
            };
        }
        if !decision.is_complete() {
            let clarification_question = decision.clarification_question.unwrap_or_else(|| {
                format!("Please provide: {}", decision.missing_parameters.join(", "))
            });
            return AgentOutcome::Incomplete {
                intent: decision.intent,
                missing_parameters: decision.missing_parameters,
                clarification_question,
            };
        }
        self.run(decision.intent, decision.parameters, decision.confidence, Approval::Pending)
            .await
    }

    async fn run(&self, intent: String, parameters: Map<String, Value>, confidence: f64, approval: Approval) -> AgentOutcome {
        match self.executor.execute(&intent, &parameters, approval).await {
            Ok(result) => AgentOutcome::Success {
                intent,
                result,
                confidence,
            },
            Err(e) => {
                if e.is_transport() {
                    tracing::error!(%intent, error = %e, "Tool dispatch failed");
                } else {
                    tracing::warn!(%intent, error = %e, "Tool dispatch failed");
                }
                AgentOutcome::Error {
                    intent,
                    error: e.to_string(),
                }
            }
        }
    }

    /// 两阶段提交的第二阶段：确认则带草稿重新执行，拒绝则请用户说明修改
    pub async fn confirm(&self, session: &mut Session, confirmation: Confirmation) -> AgentOutcome {
        let pending = confirmation.original_request.or_else(|| session.pending.take());
        session.pending = None;

        let (user_turn, outcome) = match pending {
            None => (
                "[confirmation]".to_string(),
                AgentOutcome::Error {
                    intent: "confirm_action".into(),
                    error: "There is no generated action waiting for confirmation.".into(),
                },
            ),
            Some(p) if !confirmation.confirmed => (
                format!("[declined {}]", p.intent),
                AgentOutcome::Incomplete {
                    clarification_question: format!(
                        "Okay, I won't publish it. What would you like to change about the {}?",
                        label(&p.intent)
                    ),
                    intent: p.intent,
                    missing_parameters: Vec::new(),
                },
            ),
            Some(p) => {
                let user_turn = format!("[confirmed {}]", p.intent);
                let approval = Approval::Confirmed {
                    draft: (!p.draft.is_null()).then_some(p.draft),
                };
                (user_turn, self.run(p.intent, p.parameters, 1.0, approval).await)
            }
        };
        session.memory.add(user_turn, memory_summary(&outcome));
        tracing::info!(status = outcome.status(), intent = %outcome.intent(), "Confirmation handled");
        outcome
    }
}

fn memory_summary(outcome: &AgentOutcome) -> String {
    match outcome {
        AgentOutcome::Incomplete {
            clarification_question,
            ..
        } => clarification_question.clone(),
        AgentOutcome::Success { intent, result, .. } => truncate(
            &format!("Executed {intent}: {}", result),
            SUMMARY_MAX_CHARS,
        ),
        AgentOutcome::Error { intent, error } => format!("Failed {intent}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::lms::NoopLmsClient;
    use crate::tools::{ToolServices, ToolRegistry};
    use serde_json::json;

    fn orchestrator(llm: Arc<MockLlmClient>) -> DialogueOrchestrator {
        let services = ToolServices::new(llm.clone(), Arc::new(NoopLmsClient));
        let executor = ToolExecutor::new(Arc::new(ToolRegistry::builtin()), Arc::new(services), 5);
        DialogueOrchestrator::new(llm, Arc::new(executor))
    }

    #[tokio::test]
    async fn test_incomplete_records_clarification() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"intent": "generate_quiz", "parameters": {}, "missing_parameters": ["course_id", "topic"], "clarification_question": "Which course and topic?", "confidence": 0.7}"#,
        ]));
        let orch = orchestrator(llm);
        let mut session = Session::new(5);
        let outcome = orch.handle(&mut session, "Generate a quiz", &RequestHints::default()).await;
        match &outcome {
            AgentOutcome::Incomplete {
                missing_parameters,
                clarification_question,
                ..
            } => {
                assert_eq!(missing_parameters, &vec!["course_id".to_string(), "topic".to_string()]);
                assert_eq!(clarification_question, "Which course and topic?");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.memory.len(), 2);
        assert_eq!(session.memory.get_history()[1].content, "Which course and topic?");
    }

    #[tokio::test]
    async fn test_resolution_failure_is_error_state() {
        let llm = Arc::new(MockLlmClient::with_responses(["not json at all"]));
        let orch = orchestrator(llm);
        let mut session = Session::new(5);
        let outcome = orch.handle(&mut session, "hmm", &RequestHints::default()).await;
        assert_eq!(outcome.status(), "error");
        assert_eq!(outcome.intent(), "error");
        assert_eq!(session.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_success_serializes_envelope() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"intent": "send_reminder", "parameters": {"event_type": "midterm"}, "confidence": 0.9}"#,
            "The midterm is next Monday.",
        ]));
        let orch = orchestrator(llm);
        let mut session = Session::new(5);
        let outcome = orch.handle(&mut session, "remind about the midterm", &RequestHints::default()).await;
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], json!("success"));
        assert_eq!(v["intent"], json!("send_reminder"));
        assert_eq!(v["result"]["reminder"], json!("The midterm is next Monday."));
        assert_eq!(v["confidence"], json!(0.9));
        assert!(outcome.reply().contains("The midterm is next Monday."));
        assert!(session.pending.is_none());
    }

    #[tokio::test]
    async fn test_declined_confirmation_asks_for_changes() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"intent": "post_announcement", "parameters": {"forum_id": "3", "context": "lab moved"}, "confidence": 0.8}"#,
            "The lab is moved to room 204.",
        ]));
        let orch = orchestrator(llm);
        let mut session = Session::new(5);
        let outcome = orch.handle(&mut session, "announce lab move in forum 3", &RequestHints::default()).await;
        assert!(outcome.requires_confirmation());
        assert!(session.pending.is_some());

        let declined = orch
            .confirm(&mut session, Confirmation { confirmed: false, original_request: None })
            .await;
        assert_eq!(declined.status(), "incomplete");
        assert!(declined.reply().contains("post announcement"));
        assert!(session.pending.is_none());
        assert_eq!(session.memory.len(), 4);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_error() {
        let orch = orchestrator(Arc::new(MockLlmClient::new()));
        let mut session = Session::new(5);
        let outcome = orch
            .confirm(&mut session, Confirmation { confirmed: true, original_request: None })
            .await;
        assert_eq!(outcome.status(), "error");
        assert_eq!(session.memory.len(), 2);
    }
}
