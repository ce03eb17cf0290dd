//! 记忆层：按会话隔离的短期对话记忆（有界，进程内，不持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role, NO_HISTORY};
