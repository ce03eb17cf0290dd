//! recommend_resources / schedule_sessions

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::context::prompt_value;
use crate::tools::schema::{ResourceParams, ScheduleParams};
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct ResourceHandler;

#[async_trait]
impl ActionHandler for ResourceHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: ResourceParams = parse_params(Action::RecommendResources.name(), &params)?;
        let profile = p.student_profile.as_ref().map(prompt_value).unwrap_or_else(|| "(not provided)".into());
        let prompt = format!(
            "Recommend learning resources for:\n\
             Student Profile: {profile}\n\
             Topic: {topic}\n\n\
             Include books, videos, and articles. Return JSON:\n\
             {{\"books\": [...], \"videos\": [...], \"articles\": [...]}}",
            topic = p.topic,
        );
        ctx.generate_json(prompt, Action::RecommendResources.fallback_key()).await
    }
}

pub struct ScheduleHandler;

#[async_trait]
impl ActionHandler for ScheduleHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: ScheduleParams = parse_params(Action::ScheduleSessions.name(), &params)?;
        let course_schedule = p.course_schedule.as_ref().map(prompt_value).unwrap_or_else(|| "(not provided)".into());
        let prompt = format!(
            "Create an optimal study schedule based on:\n\
             Student Availability: {}\n\
             Course Schedule: {}\n\n\
             Return JSON with session times and durations.",
            prompt_value(&p.student_availability),
            course_schedule
        );
        ctx.generate_json(prompt, Action::ScheduleSessions.fallback_key()).await
    }
}
