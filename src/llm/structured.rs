//! LLM 输出的 JSON 解析
//!
//! 解析结果是显式的 `Structured`：成功得到 JSON 值，或保留原文作为回退。
//! 调用方按各自的回退字段名包装原文，LLM 输出格式错误永远不会变成错误返回。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// 结构化输出的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum Structured {
    /// 解析出的 JSON 值
    Parsed(Value),
    /// 无法解析时保留的原始文本（已 trim）
    Fallback(String),
}

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_regex() -> &'static Regex {
    FENCE_RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap())
}

/// 从 LLM 输出中提取 JSON：优先 ```json 代码块，其次整段，最后取首个 `{` 到末个 `}`
pub fn parse_structured(raw: &str) -> Structured {
    let trimmed = raw.trim();
    if let Some(inner) = fence_regex()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
    {
        if let Ok(v) = serde_json::from_str::<Value>(inner) {
            return Structured::Parsed(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Structured::Parsed(v);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Structured::Parsed(v);
            }
        }
    }
    Structured::Fallback(trimmed.to_string())
}

impl Structured {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Structured::Parsed(_))
    }

    /// 转为 JSON 对象：解析出的对象原样返回；其它情况以 `fallback_key` 包装
    pub fn into_object_or(self, fallback_key: &str) -> Value {
        match self {
            Structured::Parsed(v @ Value::Object(_)) => v,
            Structured::Parsed(other) => wrap(fallback_key, other),
            Structured::Fallback(text) => {
                tracing::warn!(key = fallback_key, "LLM output is not JSON, using raw-text fallback");
                wrap(fallback_key, Value::String(text))
            }
        }
    }
}

fn wrap(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(
            parse_structured(r#" {"score": 90} "#),
            Structured::Parsed(json!({"score": 90}))
        );
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here you go:\n```json\n{\"questions\": []}\n```\nEnjoy";
        assert_eq!(parse_structured(raw), Structured::Parsed(json!({"questions": []})));
    }

    #[test]
    fn test_embedded_braces() {
        let raw = "Result => {\"answer\": \"42\"} (done)";
        assert_eq!(parse_structured(raw), Structured::Parsed(json!({"answer": "42"})));
    }

    #[test]
    fn test_fallback_wraps_raw_text() {
        let parsed = parse_structured("  Great essay, 8/10  ");
        assert!(!parsed.is_parsed());
        assert_eq!(
            parsed.into_object_or("feedback"),
            json!({"feedback": "Great essay, 8/10"})
        );
    }

    #[test]
    fn test_non_object_json_is_wrapped() {
        let parsed = parse_structured("[1, 2]");
        assert_eq!(parsed.into_object_or("raw_output"), json!({"raw_output": [1, 2]}));
    }
}
