//! LMS 协作方：课程、课程内容、成绩、论坛发帖
//!
//! LmsClient 是能力接口：每个方法都有默认实现，返回 `LmsError::Unsupported`，
//! 具体后端只覆盖自己支持的部分。调用方据此给出结构化的 `{error}`，不做反射式探测。

pub mod format;
pub mod moodle;
pub mod noop;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use format::format_quiz_as_html;
pub use moodle::MoodleClient;
pub use noop::NoopLmsClient;

#[derive(Error, Debug, Clone)]
pub enum LmsError {
    #[error("LMS capability not supported: {0}")]
    Unsupported(&'static str),

    /// 连接失败、超时
    #[error("LMS transport error: {0}")]
    Transport(String),

    #[error("LMS HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// LMS 以 200 返回的业务异常（exception / errorcode / message）
    #[error("LMS error [{errorcode}]: {message}")]
    Remote { errorcode: String, message: String },

    #[error("LMS response decode error: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl LmsError {
    pub fn is_transport(&self) -> bool {
        matches!(self, LmsError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub shortname: String,
    /// 纯文本摘要（HTML 已转换）
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modname: String,
}

/// 课程内容中的一节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSection {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

impl CourseSection {
    /// 一行大纲：节名、摘要与模块名
    pub fn outline_line(&self) -> String {
        let modules = self
            .modules
            .iter()
            .map(|m| m.name.as_str())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let mut line = self.name.clone();
        if !self.summary.trim().is_empty() {
            line.push_str(": ");
            line.push_str(self.summary.trim());
        }
        if !modules.is_empty() {
            line.push_str(&format!(" [{modules}]"));
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// `news` 为公告论坛
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// 以论坛帖形式发布的测验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizPost {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Value>,
}

/// 发帖回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub forum_id: String,
    pub discussion_id: Option<i64>,
}

/// 公告论坛优先，否则取第一个
pub fn pick_quiz_forum(forums: &[Forum]) -> Option<&Forum> {
    forums.iter().find(|f| f.kind == "news").or_else(|| forums.first())
}

#[async_trait]
pub trait LmsClient: Send + Sync {
    /// 是否连接了真实 LMS
    fn is_configured(&self) -> bool {
        false
    }

    async fn get_courses(&self) -> Result<Vec<Course>, LmsError> {
        Err(LmsError::Unsupported("get_courses"))
    }

    async fn get_course_contents(&self, _course_id: &str) -> Result<Vec<CourseSection>, LmsError> {
        Err(LmsError::Unsupported("get_course_contents"))
    }

    async fn get_forums(&self, _course_id: &str) -> Result<Vec<Forum>, LmsError> {
        Err(LmsError::Unsupported("get_forums"))
    }

    /// 成绩项（原样返回 LMS 的 JSON）
    async fn get_user_grades(&self, _course_id: &str, _user_id: Option<&str>) -> Result<Value, LmsError> {
        Err(LmsError::Unsupported("get_user_grades"))
    }

    async fn post_forum_discussion(
        &self,
        _forum_id: &str,
        _subject: &str,
        _message: &str,
        _pinned: bool,
    ) -> Result<PostReceipt, LmsError> {
        Err(LmsError::Unsupported("post_forum_discussion"))
    }

    /// 将测验渲染为 HTML，作为置顶讨论发到课程的公告论坛
    async fn post_quiz(&self, course_id: &str, quiz: &QuizPost) -> Result<PostReceipt, LmsError> {
        let forums = self.get_forums(course_id).await?;
        let forum = pick_quiz_forum(&forums)
            .ok_or_else(|| LmsError::NotFound(format!("no forum in course {course_id}")))?;
        let subject = format!("Quiz: {}", quiz.name);
        self.post_forum_discussion(&forum.id.to_string(), &subject, &format_quiz_as_html(quiz), true)
            .await
    }
}
