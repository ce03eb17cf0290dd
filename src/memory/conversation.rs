//! 短期记忆：对话历史
//!
//! 保留最近 N 轮对话（user/assistant 对），超出时按 FIFO 剪枝，供意图识别的上下文与 `/memory` 接口使用。
//! 仅存在于进程内，不做持久化。

use serde::{Deserialize, Serialize};

/// 对话历史为空时 `get_context` 返回的哨兵文本
pub const NO_HISTORY: &str = "No previous conversation history.";

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// 单条消息；写入对话记忆后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 短期记忆：最近 N 轮对话（每轮含 user + assistant，故最多保留 max_turns*2 条消息）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    /// 追加一轮对话（user + assistant），超出容量时丢弃最旧的消息
    pub fn add(&mut self, user_text: impl Into<String>, assistant_text: impl Into<String>) {
        self.messages.push(Message::user(user_text));
        self.messages.push(Message::assistant(assistant_text));
        self.prune();
    }

    /// 按角色标注渲染全部对话；为空时返回 [`NO_HISTORY`]
    pub fn get_context(&self) -> String {
        if self.messages.is_empty() {
            return NO_HISTORY.to_string();
        }
        let mut text = String::from("Recent conversation history:\n");
        for msg in &self.messages {
            text.push_str(msg.role.label());
            text.push_str(": ");
            text.push_str(&msg.content);
            text.push('\n');
        }
        text
    }

    pub fn get_history(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    /// 超出 max_turns*2 时丢弃最旧的消息，保留最近部分
    fn prune(&mut self) {
        let keep = self.capacity();
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
