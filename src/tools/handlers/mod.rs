//! 各动作的处理器
//!
//! 流程一致：解析参数结构 → （可选）检索上下文 → 一次结构化生成 → 按回退字段解析 → （发帖类）确认后发布。

mod announcement;
mod grading;
mod graph_qa;
mod performance;
mod quiz;
mod resources;
mod study;

use std::sync::Arc;

pub use announcement::{AnnouncementHandler, ReminderHandler};
pub use grading::GradingHandler;
pub use graph_qa::QuestionHandler;
pub use performance::PerformanceHandler;
pub use quiz::QuizHandler;
pub use resources::{ResourceHandler, ScheduleHandler};
pub use study::StudyPlanHandler;

use crate::tools::{Action, ActionHandler};

/// 动作对应的内置处理器
pub fn builtin(action: Action) -> Arc<dyn ActionHandler> {
    match action {
        Action::GenerateQuiz => Arc::new(QuizHandler),
        Action::GradeAssignment => Arc::new(GradingHandler),
        Action::PostAnnouncement => Arc::new(AnnouncementHandler),
        Action::SendReminder => Arc::new(ReminderHandler),
        Action::AnalyzePerformance => Arc::new(PerformanceHandler),
        Action::RecommendResources => Arc::new(ResourceHandler),
        Action::ScheduleSessions => Arc::new(ScheduleHandler),
        Action::CreateStudyPlan => Arc::new(StudyPlanHandler),
        Action::AnswerQuestion => Arc::new(QuestionHandler),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::llm::MockLlmClient;
    use crate::lms::{CourseSection, Forum, LmsClient, LmsError, PostReceipt};
    use crate::tools::{Approval, ToolContext, ToolServices};

    /// 记录发帖调用的 LMS 替身
    #[derive(Default)]
    pub struct RecordingLms {
        pub posts: Mutex<Vec<(String, String, String)>>,
        pub fail_posts: bool,
        /// 课程大纲请求以传输错误失败
        pub fail_contents: bool,
        pub grades: Option<Value>,
    }

    impl RecordingLms {
        pub fn post_count(&self) -> usize {
            self.posts.lock().map(|p| p.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LmsClient for RecordingLms {
        fn is_configured(&self) -> bool {
            true
        }

        async fn get_forums(&self, _course_id: &str) -> Result<Vec<Forum>, LmsError> {
            Ok(vec![Forum {
                id: 5,
                name: "Announcements".into(),
                kind: "news".into(),
            }])
        }

        async fn get_user_grades(&self, _course_id: &str, _user_id: Option<&str>) -> Result<Value, LmsError> {
            self.grades.clone().ok_or(LmsError::Unsupported("get_user_grades"))
        }

        async fn get_course_contents(&self, _course_id: &str) -> Result<Vec<CourseSection>, LmsError> {
            if self.fail_contents {
                return Err(LmsError::Transport("timed out".into()));
            }
            Err(LmsError::Unsupported("get_course_contents"))
        }

        async fn post_forum_discussion(
            &self,
            forum_id: &str,
            subject: &str,
            message: &str,
            _pinned: bool,
        ) -> Result<PostReceipt, LmsError> {
            if self.fail_posts {
                return Err(LmsError::Transport("connection refused".into()));
            }
            if let Ok(mut posts) = self.posts.lock() {
                posts.push((forum_id.into(), subject.into(), message.into()));
            }
            Ok(PostReceipt {
                forum_id: forum_id.into(),
                discussion_id: Some(99),
            })
        }
    }

    pub fn ctx(llm: Arc<MockLlmClient>, lms: Arc<RecordingLms>, approval: Approval) -> ToolContext {
        ToolContext::new(Arc::new(ToolServices::new(llm, lms)), approval)
    }
}
