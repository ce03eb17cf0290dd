//! 动作（工具）的封闭枚举
//!
//! 新增工具 = 新增一个变体 + 一个参数结构 + 一个处理器。

use std::fmt;
use std::str::FromStr;

use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};

use crate::tools::schema::{
    AnnouncementParams, GradingParams, PerformanceParams, QuestionParams, QuizParams,
    ReminderParams, ResourceParams, ScheduleParams, StudyPlanParams,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GenerateQuiz,
    GradeAssignment,
    PostAnnouncement,
    SendReminder,
    AnalyzePerformance,
    RecommendResources,
    ScheduleSessions,
    CreateStudyPlan,
    AnswerQuestion,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::GenerateQuiz,
        Action::GradeAssignment,
        Action::PostAnnouncement,
        Action::SendReminder,
        Action::AnalyzePerformance,
        Action::RecommendResources,
        Action::ScheduleSessions,
        Action::CreateStudyPlan,
        Action::AnswerQuestion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::GenerateQuiz => "generate_quiz",
            Action::GradeAssignment => "grade_assignment",
            Action::PostAnnouncement => "post_announcement",
            Action::SendReminder => "send_reminder",
            Action::AnalyzePerformance => "analyze_performance",
            Action::RecommendResources => "recommend_resources",
            Action::ScheduleSessions => "schedule_sessions",
            Action::CreateStudyPlan => "create_study_plan",
            Action::AnswerQuestion => "answer_question",
        }
    }

    /// 生成结果不是 JSON 时包装原文所用的字段名
    pub fn fallback_key(self) -> &'static str {
        match self {
            Action::GenerateQuiz => "raw_output",
            Action::GradeAssignment => "feedback",
            Action::PostAnnouncement => "announcement",
            Action::SendReminder => "reminder",
            Action::AnalyzePerformance => "analysis_text",
            Action::RecommendResources => "resources_text",
            Action::ScheduleSessions => "schedule_text",
            Action::CreateStudyPlan => "plan_text",
            Action::AnswerQuestion => "answer",
        }
    }

    /// 有外部副作用（LMS 发帖），需要二次确认
    pub fn is_posting(self) -> bool {
        matches!(self, Action::GenerateQuiz | Action::PostAnnouncement)
    }

    pub fn parameter_schema(self) -> RootSchema {
        match self {
            Action::GenerateQuiz => schema_for!(QuizParams),
            Action::GradeAssignment => schema_for!(GradingParams),
            Action::PostAnnouncement => schema_for!(AnnouncementParams),
            Action::SendReminder => schema_for!(ReminderParams),
            Action::AnalyzePerformance => schema_for!(PerformanceParams),
            Action::RecommendResources => schema_for!(ResourceParams),
            Action::ScheduleSessions => schema_for!(ScheduleParams),
            Action::CreateStudyPlan => schema_for!(StudyPlanParams),
            Action::AnswerQuestion => schema_for!(QuestionParams),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "send_reminders" {
            return Ok(Action::SendReminder);
        }
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("Unknown tool: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for action in Action::ALL {
            assert_eq!(action.name().parse::<Action>().unwrap(), action);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                serde_json::Value::String(action.name().into())
            );
        }
        assert_eq!("send_reminders".parse::<Action>().unwrap(), Action::SendReminder);
        assert!("delete_course".parse::<Action>().is_err());
    }
}
