//! analyze_performance：读取 LMS 成绩项后生成分析
//!
//! 成绩读取失败时不调用生成服务，直接返回 `{error}`。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::tools::schema::PerformanceParams;
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct PerformanceHandler;

#[async_trait]
impl ActionHandler for PerformanceHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: PerformanceParams = parse_params(Action::AnalyzePerformance.name(), &params)?;
        let grades = match ctx
            .services
            .lms
            .get_user_grades(&p.course_id, p.student_id.as_deref())
            .await
        {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(course_id = %p.course_id, error = %e, "Grade fetch failed");
                return Ok(json!({
                    "course_id": p.course_id,
                    "error": format!("Could not fetch grades: {e}"),
                }));
            }
        };

        let prompt = format!(
            "Analyze this student performance data:\n{}\n\n\
             Identify strengths, weaknesses, and give 3 actionable recommendations.\n\
             Return JSON: {{\"strengths\": [...], \"weaknesses\": [...], \"recommendations\": [...]}}",
            serde_json::to_string_pretty(&grades).unwrap_or_else(|_| grades.to_string())
        );
        ctx.generate_json(prompt, Action::AnalyzePerformance.fallback_key()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::handlers::test_support::{ctx, RecordingLms};
    use crate::tools::Approval;

    fn params() -> Map<String, Value> {
        json!({"course_id": "2"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_grade_fetch_failure_is_error_result() {
        let llm = Arc::new(MockLlmClient::new());
        let result = PerformanceHandler
            .handle(params(), &ctx(llm.clone(), Arc::new(RecordingLms::default()), Approval::Pending))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Could not fetch grades"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analysis_fallback() {
        let llm = Arc::new(MockLlmClient::with_responses(["Strong on quizzes, weak on labs."]));
        let lms = Arc::new(RecordingLms {
            grades: Some(json!({"usergrades": [{"gradeitems": [{"itemname": "Quiz 1", "graderaw": 9}]}]})),
            ..Default::default()
        });
        let result = PerformanceHandler
            .handle(params(), &ctx(llm.clone(), lms, Approval::Pending))
            .await
            .unwrap();
        assert_eq!(result["analysis_text"], json!("Strong on quizzes, weak on labs."));
        assert!(llm.prompt_of(0).unwrap().contains("Quiz 1"));
    }
}
