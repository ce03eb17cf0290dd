//! Moodle REST 客户端
//!
//! 所有调用都是对 `server.php` 的表单 POST：`wstoken`、`moodlewsrestformat=json`、`wsfunction` 加函数参数。
//! Moodle 的业务错误以 HTTP 200 返回，响应体含 `exception` / `errorcode` / `message`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::lms::{Course, CourseSection, Forum, LmsClient, LmsError, PostReceipt};

const HTML_WIDTH: usize = 100;

pub struct MoodleClient {
    client: Client,
    base_url: String,
    token: String,
}

impl MoodleClient {
    /// `base_url` 为完整的 REST 端点（含 `/webservice/rest/server.php`）
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn call(&self, function: &str, params: &[(String, String)]) -> Result<Value, LmsError> {
        let mut form: Vec<(String, String)> = vec![
            ("wstoken".into(), self.token.clone()),
            ("moodlewsrestformat".into(), "json".into()),
            ("wsfunction".into(), function.into()),
        ];
        form.extend_from_slice(params);

        tracing::debug!(function, "Moodle call");
        let resp = self
            .client
            .post(&self.base_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(function, error = %e, "Moodle request failed");
                LmsError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LmsError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LmsError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| LmsError::Decode(e.to_string()))?;
        if let Some(exception) = value.get("exception") {
            let errorcode = value
                .get("errorcode")
                .and_then(Value::as_str)
                .unwrap_or_else(|| exception.as_str().unwrap_or("unknown"))
                .to_string();
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            tracing::warn!(function, %errorcode, %message, "Moodle returned an exception");
            return Err(LmsError::Remote { errorcode, message });
        }
        Ok(value)
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        function: &str,
        params: &[(String, String)],
    ) -> Result<T, LmsError> {
        let value = self.call(function, params).await?;
        serde_json::from_value(value).map_err(|e| LmsError::Decode(format!("{function}: {e}")))
    }
}

fn html_to_text(html: &str) -> String {
    if !html.contains('<') {
        return html.trim().to_string();
    }
    match html2text::from_read(html.as_bytes(), HTML_WIDTH) {
        Ok(text) => text.trim().to_string(),
        Err(_) => html.to_string(),
    }
}

fn param(k: &str, v: impl ToString) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[async_trait]
impl LmsClient for MoodleClient {
    fn is_configured(&self) -> bool {
        true
    }

    async fn get_courses(&self) -> Result<Vec<Course>, LmsError> {
        let mut courses: Vec<Course> = self.call_as("core_course_get_courses", &[]).await?;
        for c in &mut courses {
            c.summary = html_to_text(&c.summary);
        }
        Ok(courses)
    }

    async fn get_course_contents(&self, course_id: &str) -> Result<Vec<CourseSection>, LmsError> {
        let mut sections: Vec<CourseSection> = self
            .call_as("core_course_get_contents", &[param("courseid", course_id)])
            .await?;
        for s in &mut sections {
            s.summary = html_to_text(&s.summary);
        }
        Ok(sections)
    }

    async fn get_forums(&self, course_id: &str) -> Result<Vec<Forum>, LmsError> {
        self.call_as(
            "mod_forum_get_forums_by_courses",
            &[param("courseids[0]", course_id)],
        )
        .await
    }

    async fn get_user_grades(&self, course_id: &str, user_id: Option<&str>) -> Result<Value, LmsError> {
        let mut params = vec![param("courseid", course_id)];
        if let Some(uid) = user_id {
            params.push(param("userid", uid));
        }
        self.call("gradereport_user_get_grade_items", &params).await
    }

    async fn post_forum_discussion(
        &self,
        forum_id: &str,
        subject: &str,
        message: &str,
        pinned: bool,
    ) -> Result<PostReceipt, LmsError> {
        let mut params = vec![
            param("forumid", forum_id),
            param("subject", subject),
            param("message", message),
        ];
        if pinned {
            params.push(param("options[0][name]", "discussionpinned"));
            params.push(param("options[0][value]", 1));
        }
        let value = self.call("mod_forum_add_discussion", &params).await?;
        let receipt = PostReceipt {
            forum_id: forum_id.to_string(),
            discussion_id: value.get("discussionid").and_then(Value::as_i64),
        };
        tracing::info!(forum_id, discussion_id = ?receipt.discussion_id, "Forum discussion posted");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lms::QuizPost;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> MoodleClient {
        MoodleClient::new(format!("{}/webservice/rest/server.php", server.uri()), "tok", 5)
    }

    #[tokio::test]
    async fn test_get_courses_sends_token_and_strips_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webservice/rest/server.php"))
            .and(body_string_contains("wstoken=tok"))
            .and(body_string_contains("wsfunction=core_course_get_courses"))
            .and(body_string_contains("moodlewsrestformat=json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "fullname": "Algorithms", "shortname": "ALG", "summary": "<p>Sorting and graphs</p>"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let courses = client(&server).await.get_courses().await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].fullname, "Algorithms");
        assert!(courses[0].summary.contains("Sorting and graphs"));
        assert!(!courses[0].summary.contains("<p>"));
    }

    #[tokio::test]
    async fn test_exception_body_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "exception": "moodle_exception",
                "errorcode": "invalidtoken",
                "message": "Invalid token - token not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.get_course_contents("2").await.unwrap_err();
        match err {
            LmsError::Remote { errorcode, message } => {
                assert_eq!(errorcode, "invalidtoken");
                assert!(message.contains("token not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        let err = client(&server).await.get_user_grades("2", None).await.unwrap_err();
        assert!(matches!(err, LmsError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_post_quiz_uses_news_forum_and_pins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("wsfunction=mod_forum_get_forums_by_courses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 7, "name": "General", "type": "general"},
                {"id": 8, "name": "Announcements", "type": "news"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("wsfunction=mod_forum_add_discussion"))
            .and(body_string_contains("forumid=8"))
            .and(body_string_contains("discussionpinned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"discussionid": 41, "warnings": []})))
            .expect(1)
            .mount(&server)
            .await;

        let quiz = QuizPost {
            name: "AI Quiz - Sorting".into(),
            description: "Generated quiz on sorting".into(),
            questions: vec![json!({"question": "Q?", "options": ["a", "b"], "answer": "a"})],
        };
        let receipt = client(&server).await.post_quiz("2", &quiz).await.unwrap();
        assert_eq!(receipt.forum_id, "8");
        assert_eq!(receipt.discussion_id, Some(41));
    }
}
