//! generate_quiz：检索课程材料出题，确认后以置顶论坛帖发布
//!
//! 上下文来源依次为：知识库检索 → LMS 课程大纲 → 无（仅凭主题）。
//! 检索为空或能力不支持时降级到下一来源；嵌入服务、图存储或 LMS 不可达时返回错误。
//! 未确认时不调用 LMS；确认时有草稿则直接发布草稿，发帖失败仍返回已生成的测验。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::lms::QuizPost;
use crate::tools::schema::QuizParams;
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct QuizHandler;

async fn grounding(params: &QuizParams, ctx: &ToolContext) -> Result<(String, &'static str), AgentError> {
    let services = &ctx.services;
    if let Some(store) = &services.knowledge {
        let query = format!("{} {}", params.topic, params.focus_area.as_deref().unwrap_or_default());
        match store.retrieve(query.trim(), services.retrieve_top_k, None).await {
            Ok(hits) if !hits.is_empty() => {
                let text = hits
                    .iter()
                    .map(|h| format!("[{}] {}", h.doc_title, h.text))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                return Ok((text, "retrieval"));
            }
            Ok(_) => {}
            Err(e) if e.is_transport() => {
                tracing::error!(error = %e, "Quiz retrieval failed");
                return Err(e.into());
            }
            Err(e) => tracing::warn!(error = %e, "Quiz retrieval failed"),
        }
    }
    if services.lms.is_configured() {
        match services.lms.get_course_contents(&params.course_id).await {
            Ok(sections) if !sections.is_empty() => {
                let outline = sections
                    .iter()
                    .map(|s| s.outline_line())
                    .collect::<Vec<_>>()
                    .join("\n");
                return Ok((outline, "course_outline"));
            }
            Ok(_) => {}
            Err(e) if e.is_transport() => {
                tracing::error!(course_id = %params.course_id, error = %e, "Course outline fetch failed");
                return Err(e.into());
            }
            Err(e) => tracing::warn!(course_id = %params.course_id, error = %e, "Course outline unavailable"),
        }
    }
    Ok((format!("General knowledge of {}", params.topic), "none"))
}

async fn generate(params: &QuizParams, ctx: &ToolContext) -> Result<(Value, &'static str), AgentError> {
    let (course_content, source) = grounding(params, ctx).await?;
    let prompt = format!(
        "Generate a {difficulty} level quiz with {n} questions based on the following course content:\n\
         {course_content}\n\n\
         Topic: {topic}\n\
         Focus Area: {focus}\n\n\
         Include multiple choice questions with 4 options each.\n\
         Return valid JSON in this format:\n\
         {{\"questions\": [{{\"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"answer\": \"B\"}}]}}",
        difficulty = params.difficulty,
        n = params.number_of_questions,
        topic = params.topic,
        focus = params.focus(),
    );
    let quiz = ctx.generate_json(prompt, Action::GenerateQuiz.fallback_key()).await?;
    Ok((quiz, source))
}

#[async_trait]
impl ActionHandler for QuizHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let params: QuizParams = parse_params(Action::GenerateQuiz.name(), &params)?;

        let (quiz, grounding) = match ctx.approval.draft().and_then(|d| d.get("quiz")) {
            Some(draft) => (draft.clone(), "draft"),
            None => generate(&params, ctx).await?,
        };

        if !ctx.approval.is_confirmed() {
            return Ok(json!({
                "quiz": quiz,
                "course_id": params.course_id,
                "topic": params.topic,
                "grounding": grounding,
                "requires_confirmation": true,
                "posted": false,
                "message": "Review the quiz and confirm to post it to the course forum.",
            }));
        }

        let post = QuizPost {
            name: format!("AI Quiz - {}", params.focus()),
            description: format!("Generated quiz on {}", params.focus()),
            questions: quiz
                .get("questions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        };
        match ctx.services.lms.post_quiz(&params.course_id, &post).await {
            Ok(receipt) => Ok(json!({
                "quiz": quiz,
                "course_id": params.course_id,
                "posted": true,
                "lms_result": receipt,
            })),
            Err(e) => {
                tracing::warn!(course_id = %params.course_id, error = %e, "Quiz posting failed");
                Ok(json!({
                    "quiz": quiz,
                    "course_id": params.course_id,
                    "posted": false,
                    "error": format!("Quiz posting failed: {e}"),
                }))
            }
        }
    }
}
