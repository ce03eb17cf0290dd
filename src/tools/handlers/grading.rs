//! grade_assignment：按评分标准打分（0-100）并给出反馈

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::context::prompt_value;
use crate::tools::schema::GradingParams;
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct GradingHandler;

#[async_trait]
impl ActionHandler for GradingHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: GradingParams = parse_params(Action::GradeAssignment.name(), &params)?;
        let prompt = format!(
            "Grade the following assignment based on this rubric.\n\
             Provide detailed feedback and a score (0-100).\n\n\
             Assignment: {assignment}\n\
             Rubric: {rubric}\n\
             Student Answer: {answer}\n\n\
             Return JSON: {{\"score\": <number>, \"feedback\": \"<text>\"}}",
            assignment = p.assignment_content.as_deref().unwrap_or("(not provided)"),
            rubric = prompt_value(&p.rubric),
            answer = p.student_answer,
        );
        let mut result = ctx.generate_json(prompt, Action::GradeAssignment.fallback_key()).await?;
        if let (Some(id), Some(obj)) = (p.assignment_id, result.as_object_mut()) {
            obj.insert("assignment_id".into(), Value::String(id));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::handlers::test_support::{ctx, RecordingLms};
    use crate::tools::Approval;
    use serde_json::json;

    #[tokio::test]
    async fn test_score_and_feedback() {
        let llm = Arc::new(MockLlmClient::with_responses([
            "```json\n{\"score\": 85, \"feedback\": \"Clear reasoning.\"}\n```",
        ]));
        let params = json!({"student_answer": "O(n log n)", "rubric": {"correctness": 70, "clarity": 30}, "assignment_id": "12"});
        let result = GradingHandler
            .handle(
                params.as_object().cloned().unwrap(),
                &ctx(llm.clone(), Arc::new(RecordingLms::default()), Approval::Pending),
            )
            .await
            .unwrap();
        assert_eq!(result["score"], json!(85));
        assert_eq!(result["assignment_id"], json!("12"));
        assert!(llm.prompt_of(0).unwrap().contains("\"correctness\": 70"));
    }
}
