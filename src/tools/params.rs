//! 按参数 schema 的强制转换与类型化解析
//!
//! LLM 抽取的参数常常类型不准：数字写成字符串、结构写成 JSON 字符串、字符串写成数字。
//! 派发前按 ToolSchema 中的 ParamKind 统一修正，无法修正时返回 InvalidParameters。

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::core::AgentError;
use crate::tools::{ParamKind, ToolSchema};

fn coerce_value(kind: ParamKind, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (ParamKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (ParamKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (ParamKind::String, v @ Value::String(_)) => Ok(v),
        (ParamKind::String, other) => Err(format!("expected text, got {other}")),

        (ParamKind::Integer, v @ Value::Number(_)) if v.as_i64().is_some() || v.as_u64().is_some() => Ok(v),
        (ParamKind::Integer, Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Value::Number(Number::from(f as i64))),
            _ => Err(format!("expected an integer, got {n}")),
        },
        (ParamKind::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|i| Value::Number(i.into()))
            .map_err(|_| format!("expected an integer, got \"{s}\"")),

        (ParamKind::Number, v @ Value::Number(_)) => Ok(v),
        (ParamKind::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("expected a number, got \"{s}\"")),

        (ParamKind::Boolean, v @ Value::Bool(_)) => Ok(v),
        (ParamKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("expected true or false, got \"{s}\"")),
        },

        (ParamKind::Any, Value::String(s)) => {
            let t = s.trim();
            if (t.starts_with('{') && t.ends_with('}')) || (t.starts_with('[') && t.ends_with(']')) {
                if let Ok(parsed) = serde_json::from_str::<Value>(t) {
                    return Ok(parsed);
                }
            }
            Ok(Value::String(s))
        }
        (ParamKind::Any, v) => Ok(v),

        (_, other) => Err(format!("unexpected value {other}")),
    }
}

/// 按 schema 修正参数类型；null 视为未提供并移除，未声明的参数原样保留
pub fn coerce_params(schema: &ToolSchema, params: &Map<String, Value>) -> Result<Map<String, Value>, AgentError> {
    let mut out = Map::new();
    for (name, value) in params {
        if value.is_null() {
            continue;
        }
        let coerced = match schema.param(name) {
            Some(spec) => coerce_value(spec.kind, value.clone())
                .map_err(|reason| AgentError::invalid_params(&schema.name, format!("{name}: {reason}")))?,
            None => value.clone(),
        };
        out.insert(name.clone(), coerced);
    }
    Ok(out)
}

/// 反序列化为动作的参数结构
pub fn parse_params<T: DeserializeOwned>(tool: &str, params: &Map<String, Value>) -> Result<T, AgentError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| AgentError::invalid_params(tool, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::QuizParams;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn quiz_schema() -> ToolSchema {
        ToolRegistry::builtin().get("generate_quiz").cloned().unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numeric_strings_and_numbers_are_coerced() {
        let params = coerce_params(
            &quiz_schema(),
            &obj(json!({"course_id": 2, "topic": "heaps", "number_of_questions": "5", "focus_area": null})),
        )
        .unwrap();
        assert_eq!(params["course_id"], json!("2"));
        assert_eq!(params["number_of_questions"], json!(5));
        assert!(!params.contains_key("focus_area"));

        let quiz: QuizParams = parse_params("generate_quiz", &params).unwrap();
        assert_eq!(quiz.number_of_questions, 5);
        assert_eq!(quiz.course_id, "2");
    }

    #[test]
    fn test_bad_integer_is_invalid_parameters() {
        let err = coerce_params(
            &quiz_schema(),
            &obj(json!({"course_id": "2", "topic": "t", "number_of_questions": "five"})),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { .. }));
        assert!(err.to_string().contains("number_of_questions"));
    }

    #[test]
    fn test_json_strings_become_structures() {
        let registry = ToolRegistry::builtin();
        let schema = registry.get("schedule_sessions").unwrap();
        let params = coerce_params(
            schema,
            &obj(json!({"student_availability": "{\"monday\": \"18:00-20:00\"}", "course_schedule": "exams in May"})),
        )
        .unwrap();
        assert_eq!(params["student_availability"]["monday"], json!("18:00-20:00"));
        assert_eq!(params["course_schedule"], json!("exams in May"));
    }

    #[test]
    fn test_missing_required_fails_typed_parse() {
        let err = parse_params::<QuizParams>("generate_quiz", &obj(json!({"topic": "t"}))).unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { .. }));
    }
}
