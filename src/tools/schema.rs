//! 各动作的参数结构（schemars 生成 JSON Schema）
//!
//! 结构体的文档注释即工具描述，字段注释即参数说明，都会原样进入意图识别 prompt。
//! 非 Option 且无默认值的字段为必填参数。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_question_count() -> u32 {
    10
}

fn default_urgency() -> String {
    "normal".to_string()
}

/// Generate a multiple-choice quiz for a course topic, grounded in the course material. The quiz is shown for review and only posted to the course forum after confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuizParams {
    /// LMS course id the quiz belongs to
    pub course_id: String,
    /// Subject of the quiz, e.g. "sorting algorithms"
    pub topic: String,
    /// Narrower focus inside the topic
    #[serde(default)]
    pub focus_area: Option<String>,
    /// easy, medium or hard
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// How many questions to generate
    #[serde(default = "default_question_count")]
    pub number_of_questions: u32,
}

impl QuizParams {
    /// 出题焦点：focus_area 优先，否则为 topic
    pub fn focus(&self) -> &str {
        self.focus_area
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.topic)
    }
}

/// Grade a student's answer against a rubric and give a 0-100 score with feedback.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GradingParams {
    /// The student's submitted answer
    pub student_answer: String,
    /// Grading rubric (text or structured criteria)
    pub rubric: Value,
    /// LMS assignment id
    #[serde(default)]
    pub assignment_id: Option<String>,
    /// The assignment prompt the student answered
    #[serde(default)]
    pub assignment_content: Option<String>,
}

/// Write a course announcement and post it to a course forum after confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnnouncementParams {
    /// LMS forum id to post into
    pub forum_id: String,
    /// What the announcement is about
    pub context: String,
    /// normal, high or low
    #[serde(default = "default_urgency")]
    pub urgency: String,
    /// Discussion subject line
    #[serde(default)]
    pub subject: Option<String>,
}

/// Write a short, friendly reminder for students about an upcoming event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReminderParams {
    /// Kind of event, e.g. "assignment deadline" or "exam"
    pub event_type: String,
    /// Dates, times, locations and other event details
    #[serde(default)]
    pub details: Option<Value>,
}

/// Analyze grade data from the LMS and report strengths, weaknesses and recommendations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceParams {
    /// LMS course id
    pub course_id: String,
    /// LMS user id of a single student
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Recommend books, videos and articles for a topic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceParams {
    /// Topic to find learning resources for
    pub topic: String,
    /// Level, interests or learning preferences of the student
    #[serde(default)]
    pub student_profile: Option<Value>,
}

/// Build a study session schedule from a student's availability.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleParams {
    /// When the student is free to study
    pub student_availability: Value,
    /// Lectures, deadlines and exams to plan around
    #[serde(default)]
    pub course_schedule: Option<Value>,
}

/// Create a personalized study plan that targets weak areas.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StudyPlanParams {
    /// Grades, weak topics or other performance information
    pub student_performance: Value,
    /// Course topics the plan should cover
    #[serde(default)]
    pub course_content: Option<Value>,
}

/// Answer a question about the course material using the uploaded documents.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuestionParams {
    /// The question to answer
    pub question: String,
    /// How many document chunks to consult
    #[serde(default)]
    pub top_k: Option<u32>,
}
