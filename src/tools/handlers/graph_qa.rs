//! answer_question：基于知识库的问答
//!
//! 知识库未配置或没有任何命中时，由文本生成服务直接作答。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::tools::schema::QuestionParams;
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

pub struct QuestionHandler;

async fn direct_answer(question: &str, ctx: &ToolContext) -> Result<Value, AgentError> {
    let prompt = format!(
        "Answer the student's question clearly and accurately.\n\n\
         Student Question: {question}\n\n\
         Respond in an educational, supportive tone."
    );
    let answer = ctx.generate_text(prompt).await?;
    Ok(json!({ "answer": answer, "sources": [], "grounded": false }))
}

#[async_trait]
impl ActionHandler for QuestionHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: QuestionParams = parse_params(Action::AnswerQuestion.name(), &params)?;
        let Some(store) = &ctx.services.knowledge else {
            return direct_answer(&p.question, ctx).await;
        };

        let top_k = p.top_k.map(|k| k as usize).unwrap_or(ctx.services.qa_top_k).max(1);
        let qa = store.answer_question(&p.question, top_k, true).await;
        if qa.context_hits.is_empty() && qa.error.is_none() {
            tracing::debug!("No stored documents matched, answering directly");
            return direct_answer(&p.question, ctx).await;
        }
        let mut result = serde_json::to_value(&qa).map_err(|e| AgentError::JsonParseError(e.to_string()))?;
        if let Some(obj) = result.as_object_mut() {
            obj.insert("grounded".into(), Value::Bool(true));
        }
        Ok(result)
    }
}
