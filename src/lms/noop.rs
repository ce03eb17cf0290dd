//! 未配置 LMS 时使用：所有能力均为 unsupported

use crate::lms::LmsClient;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLmsClient;

impl LmsClient for NoopLmsClient {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lms::{LmsError, QuizPost};

    #[tokio::test]
    async fn test_everything_unsupported() {
        let lms = NoopLmsClient;
        assert!(!lms.is_configured());
        assert!(matches!(lms.get_courses().await, Err(LmsError::Unsupported(_))));
        let quiz = QuizPost {
            name: "q".into(),
            description: "d".into(),
            questions: vec![],
        };
        assert!(matches!(
            lms.post_quiz("2", &quiz).await,
            Err(LmsError::Unsupported("get_forums"))
        ));
    }
}
