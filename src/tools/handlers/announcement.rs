//! post_announcement / send_reminder：纯文本生成
//!
//! 公告走两阶段提交：先返回草稿，确认后发到指定论坛。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::tools::context::prompt_value;
use crate::tools::schema::{AnnouncementParams, ReminderParams};
use crate::tools::{parse_params, Action, ActionHandler, ToolContext};

const DEFAULT_SUBJECT: &str = "AI Generated Announcement";

pub struct AnnouncementHandler;

#[async_trait]
impl ActionHandler for AnnouncementHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: AnnouncementParams = parse_params(Action::PostAnnouncement.name(), &params)?;
        let subject = p.subject.clone().unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        let draft = ctx
            .approval
            .draft()
            .and_then(|d| d.get("announcement"))
            .and_then(Value::as_str)
            .map(String::from);
        let announcement = match draft {
            Some(text) => text,
            None => {
                let prompt = format!(
                    "Create a {urgency} announcement for students of a university course based on:\n\
                     {context}\n\n\
                     Keep it professional, engaging, and concise. Don't exceed 150 words. \
                     Don't include greetings or sign-offs. Reply with the announcement text only.",
                    urgency = p.urgency,
                    context = p.context,
                );
                ctx.generate_text(prompt).await?
            }
        };

        if !ctx.approval.is_confirmed() {
            return Ok(json!({
                "announcement": announcement,
                "forum_id": p.forum_id,
                "subject": subject,
                "requires_confirmation": true,
                "posted": false,
                "message": "Review the announcement and confirm to post it.",
            }));
        }

        match ctx
            .services
            .lms
            .post_forum_discussion(&p.forum_id, &subject, &announcement, false)
            .await
        {
            Ok(receipt) => Ok(json!({
                "announcement": announcement,
                "forum_id": p.forum_id,
                "posted": true,
                "forum_result": receipt,
            })),
            Err(e) => {
                tracing::warn!(forum_id = %p.forum_id, error = %e, "Announcement posting failed");
                Ok(json!({
                    "announcement": announcement,
                    "forum_id": p.forum_id,
                    "posted": false,
                    "error": format!("Announcement posting failed: {e}"),
                }))
            }
        }
    }
}

pub struct ReminderHandler;

#[async_trait]
impl ActionHandler for ReminderHandler {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError> {
        let p: ReminderParams = parse_params(Action::SendReminder.name(), &params)?;
        let details = p.details.as_ref().map(prompt_value).unwrap_or_else(|| "(none)".into());
        let prompt = format!(
            "Write a friendly reminder for students about:\n\
             Event Type: {}\n\
             Details: {}\n\
             Keep it polite and short.",
            p.event_type, details
        );
        let reminder = ctx.generate_text(prompt).await?;
        Ok(json!({ "reminder": reminder, "event_type": p.event_type }))
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
        json!({"forum_id": "3", "context": "Midterm moved to Friday"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_phase_announcement() {
        let llm = Arc::new(MockLlmClient::with_responses(["  The midterm is now on Friday.  "]));
        let lms = Arc::new(RecordingLms::default());

        let first = AnnouncementHandler
            .handle(params(), &ctx(llm.clone(), lms.clone(), Approval::Pending))
            .await
            .unwrap();
        assert_eq!(first["announcement"], json!("The midterm is now on Friday."));
        assert_eq!(first["requires_confirmation"], json!(true));
        assert_eq!(lms.post_count(), 0);
        assert!(llm.prompt_of(0).unwrap().contains("Don't exceed 150 words"));

        let second = AnnouncementHandler
            .handle(
                params(),
                &ctx(llm.clone(), lms.clone(), Approval::Confirmed { draft: Some(first) }),
            )
            .await
            .unwrap();
        assert_eq!(second["posted"], json!(true));
        assert_eq!(llm.call_count(), 1);
        let posts = lms.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, DEFAULT_SUBJECT);
        assert_eq!(posts[0].2, "The midterm is now on Friday.");
    }

    #[tokio::test]
    async fn test_reminder_text() {
        let llm = Arc::new(MockLlmClient::with_responses(["Don't forget: lab report due Monday."]));
        let result = ReminderHandler
            .handle(
                json!({"event_type": "deadline", "details": {"due": "Monday"}})
                    .as_object()
                    .cloned()
                    .unwrap(),
                &ctx(llm, Arc::new(RecordingLms::default()), Approval::Pending),
            )
            .await
            .unwrap();
        assert_eq!(result["reminder"], json!("Don't forget: lab report due Monday."));
    }
}
