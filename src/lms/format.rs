//! 测验的 HTML 渲染（论坛帖正文）

use serde_json::Value;

use crate::lms::QuizPost;

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 题目字段兼容 `question` / `questionText`，选项兼容字符串或 `{optionText}`
fn field<'a>(q: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| q.get(*k))
}

pub fn format_quiz_as_html(quiz: &QuizPost) -> String {
    let mut html = format!(
        "<div class='ai-quiz'><h2>{}</h2><p><strong>Description:</strong> {}</p><hr><h3>Questions:</h3>",
        escape_html(&quiz.name),
        escape_html(&quiz.description)
    );
    for (i, q) in quiz.questions.iter().enumerate() {
        let text = field(q, &["question", "questionText"]).map(text_of).unwrap_or_default();
        html.push_str(&format!(
            "<div class='question'><h4>Question {}: {}</h4><ul>",
            i + 1,
            escape_html(&text)
        ));
        if let Some(Value::Array(options)) = q.get("options") {
            for opt in options {
                let label = match opt {
                    Value::Object(_) => opt.get("optionText").map(text_of).unwrap_or_default(),
                    other => text_of(other),
                };
                html.push_str(&format!("<li>{}</li>", escape_html(&label)));
            }
        }
        html.push_str("</ul>");
        if let Some(answer) = field(q, &["answer", "answerId"]) {
            html.push_str(&format!(
                "<p><strong>Answer:</strong> {}</p>",
                escape_html(&text_of(answer))
            ));
        }
        html.push_str("</div><hr>");
    }
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quiz_html_lists_questions_and_escapes() {
        let quiz = QuizPost {
            name: "AI Quiz - Sorting".into(),
            description: "Generated quiz on <sorting>".into(),
            questions: vec![
                json!({"question": "Fastest average sort?", "options": ["Bubble", "Quick"], "answer": "Quick"}),
                json!({"questionText": "Stable?", "options": [{"optionText": "Merge"}], "answerId": 1}),
            ],
        };
        let html = format_quiz_as_html(&quiz);
        assert!(html.contains("&lt;sorting&gt;"));
        assert!(html.contains("Question 1: Fastest average sort?"));
        assert!(html.contains("<li>Quick</li>"));
        assert!(html.contains("Question 2: Stable?"));
        assert!(html.contains("<li>Merge</li>"));
        assert!(html.contains("<strong>Answer:</strong> 1"));
    }
}
