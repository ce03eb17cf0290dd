//! create_study_plan

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::context::prompt_value;
use crate::tools::schema::StudyPlanParams;
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct StudyPlanHandler;

#[async_trait]
impl ActionHandler for StudyPlanHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: StudyPlanParams = parse_params(Action::CreateStudyPlan.name(), &params)?;
        let prompt = format!(
            "Create a personalized study plan based on:\n\
             Student Performance: {}\n\
             Course Content: {}\n\n\
             Focus on weak areas, suggest time allocations, and include motivational tips.\n\
             Return JSON.",
            prompt_value(&p.student_performance),
            p.course_content.as_ref().map(prompt_value).unwrap_or_else(|| "(not provided)".into()),
        );
        ctx.generate_json(prompt, Action::CreateStudyPlan.fallback_key()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::tools::handlers::test_support::{ctx, RecordingLms};
    use crate::tools::Approval;
    use serde_json::json;

    #[tokio::test]
    async fn test_plan_fallback_and_transport_error() {
        let llm = Arc::new(MockLlmClient::with_responses(["Week 1: revise recursion."]));
        llm.push_error(LlmError::Transport("timed out".into()));
        let params = json!({"student_performance": {"recursion": "weak"}}).as_object().cloned().unwrap();
        let c = ctx(llm, Arc::new(RecordingLms::default()), Approval::Pending);

        let plan = StudyPlanHandler.handle(params.clone(), &c).await.unwrap();
        assert_eq!(plan["plan_text"], json!("Week 1: revise recursion."));

        let err = StudyPlanHandler.handle(params, &c).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }
}
