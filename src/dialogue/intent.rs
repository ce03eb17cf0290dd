//! 意图识别与槽位抽取
//!
//! 一次结构化生成：上下文 + 当前输入 + 工具目录 + 抽取规则 → `{intent, parameters, missing_parameters,
//! clarification_question, confidence}`。生成结果只作为候选，随后按工具 schema 清洗：
//! 只保留所选工具声明过的参数，丢弃空值与占位值，缺失参数只相对所选工具的必填参数重新计算。
//! 生成服务出错或输出无法解析时返回哨兵决策 `intent = "error"`，从不向上抛错。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{LlmClient, Structured};
use crate::memory::Message;
use crate::tools::{Action, ToolRegistry, ToolSchema};

pub const ERROR_INTENT: &str = "error";

/// 模板占位符的括号形式：`<x>`、`[x]`、`{x}`、`{{x}}`
const BRACKETS: &[(char, char)] = &[('<', '>'), ('[', ']'), ('{', '}')];

/// 意图识别结果（每次输入新生成，只读消费）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub missing_parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    /// 仅供参考，不参与执行决策
    #[serde(default)]
    pub confidence: f64,
}

impl IntentDecision {
    /// 哨兵：识别失败
    pub fn error() -> Self {
        Self {
            intent: ERROR_INTENT.to_string(),
            parameters: Map::new(),
            missing_parameters: Vec::new(),
            clarification_question: None,
            confidence: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.intent == ERROR_INTENT
    }

    pub fn is_complete(&self) -> bool {
        self.missing_parameters.is_empty()
    }
}

/// 随聊天请求一起提交的 UI 上下文；工具声明了对应参数时视为用户明确提供
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestHints {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub forum_id: Option<String>,
}

impl RequestHints {
    pub fn is_empty(&self) -> bool {
        self.course_id.is_none() && self.forum_id.is_none()
    }

    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("course_id", &self.course_id), ("forum_id", &self.forum_id)]
            .into_iter()
            .filter_map(|(k, v)| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(|v| (k, v)))
    }
}

/// LLM 返回的原始决策，字段一律宽松接收
#[derive(Debug, Default, Deserialize)]
struct RawDecision {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
    #[serde(default)]
    clarification_question: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            t.is_empty()
                || t.chars().all(|c| c == '.' || c == '?')
                || BRACKETS
                    .iter()
                    .any(|&(open, close)| t.len() > 1 && t.starts_with(open) && t.ends_with(close))
        }
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn confidence_of(v: Option<&Value>) -> f64 {
    let c = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().map(|x| if x > 1.0 { x / 100.0 } else { x }).unwrap_or(0.0),
        _ => 0.0,
    };
    if c.is_finite() {
        c.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn default_question(schema: &ToolSchema, missing: &[String]) -> String {
    let names = missing
        .iter()
        .map(|m| m.replace('_', " "))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "To {} I still need the following: {}. Could you provide {}?",
        schema.name.replace('_', " "),
        names,
        if missing.len() == 1 { "it" } else { "them" }
    )
}

/// 按所选工具的 schema 清洗原始决策
pub fn sanitize(raw: Value, registry: &ToolRegistry, hints: &RequestHints) -> IntentDecision {
    let raw: RawDecision = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Intent JSON has unexpected shape");
            return IntentDecision::error();
        }
    };
    let intent = raw.intent.unwrap_or_default().trim().to_string();
    if intent.is_empty() || intent == ERROR_INTENT {
        return IntentDecision::error();
    }
    let confidence = confidence_of(raw.confidence.as_ref());

    let schema = intent
        .parse::<Action>()
        .ok()
        .and_then(|a| registry.schema_of(a));
    let Some(schema) = schema else {
        tracing::warn!(%intent, "Intent does not match any registered tool");
        return IntentDecision {
            intent,
            parameters: Map::new(),
            missing_parameters: Vec::new(),
            clarification_question: None,
            confidence,
        };
    };

    let mut parameters = Map::new();
    if let Some(Value::Object(extracted)) = raw.parameters {
        for (name, value) in extracted {
            if !schema.declares(&name) {
                tracing::debug!(tool = %schema.name, param = %name, "Dropping undeclared parameter");
                continue;
            }
            if is_placeholder(&value) {
                tracing::debug!(tool = %schema.name, param = %name, "Dropping placeholder value");
                continue;
            }
            parameters.insert(name, value);
        }
    }
    for (name, value) in hints.pairs() {
        if schema.declares(name) && !parameters.contains_key(name) {
            parameters.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    let missing_parameters: Vec<String> = schema
        .required_params
        .iter()
        .filter(|p| !parameters.contains_key(p.as_str()))
        .cloned()
        .collect();
    let clarification_question = if missing_parameters.is_empty() {
        None
    } else {
        let asked = match raw.clarification_question {
            Some(Value::String(q)) if !q.trim().is_empty() => Some(q.trim().to_string()),
            _ => None,
        };
        Some(asked.unwrap_or_else(|| default_question(schema, &missing_parameters)))
    };

    IntentDecision {
        intent: schema.name.clone(),
        parameters,
        missing_parameters,
        clarification_question,
        confidence,
    }
}

pub struct IntentResolver {
    llm: Arc<dyn LlmClient>,
}

impl IntentResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn build_prompt(
        utterance: &str,
        memory_context: &str,
        registry: &ToolRegistry,
        hints: &RequestHints,
    ) -> String {
        let request_context = if hints.is_empty() {
            String::new()
        } else {
            let pairs = hints
                .pairs()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("\nThe user interface supplied these values with the request: {pairs}\n")
        };
        format!(
            "You are the intent analyzer of an academic teaching assistant.\n\n\
             {memory_context}\n\
             Current user request: {utterance}\n\
             {request_context}\n\
             Available tools:\n{catalogue}\n\n\
             Rules:\n\
             1. Choose exactly one tool name from the list above as \"intent\".\n\
             2. Only extract a parameter value if the user explicitly stated it in the current request \
             or in the conversation history above.\n\
             3. Never invent, guess or use placeholder values. Leave a parameter out if it was not stated.\n\
             4. \"missing_parameters\" lists only the REQUIRED parameters of the chosen tool that were not stated. \
             Never list parameters of other tools.\n\
             5. If anything is missing, write one short \"clarification_question\" asking for all of it.\n\
             6. \"confidence\" is a number between 0 and 1.\n\n\
             Return only this JSON object:\n\
             {{\"intent\": \"tool_name\", \"parameters\": {{}}, \"missing_parameters\": [], \
             \"clarification_question\": null, \"confidence\": 0.0}}",
            catalogue = registry.format_for_prompt(),
        )
    }

    pub async fn resolve(&self, utterance: &str, memory_context: &str, registry: &ToolRegistry) -> IntentDecision {
        self.resolve_with_hints(utterance, memory_context, registry, &RequestHints::default())
            .await
    }

    pub async fn resolve_with_hints(
        &self,
        utterance: &str,
        memory_context: &str,
        registry: &ToolRegistry,
        hints: &RequestHints,
    ) -> IntentDecision {
        let prompt = Self::build_prompt(utterance, memory_context, registry, hints);
        tracing::debug!(prompt_len = prompt.len(), "Resolving intent");

        let structured = match self.llm.complete_json(&[Message::user(prompt)]).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Intent resolution failed");
                return IntentDecision::error();
            }
        };
        let decision = match structured {
            Structured::Parsed(v @ Value::Object(_)) => sanitize(v, registry, hints),
            Structured::Parsed(_) | Structured::Fallback(_) => {
                tracing::warn!("Intent response is not a JSON object");
                IntentDecision::error()
            }
        };
        tracing::info!(
            intent = %decision.intent,
            missing = ?decision.missing_parameters,
            confidence = decision.confidence,
            "Intent resolved"
        );
        decision
    }
}
