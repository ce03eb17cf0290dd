//! 核心编排层：错误类型与对话编排器

pub mod error;
pub mod orchestrator;

pub use error::AgentError;
pub use orchestrator::{AgentOutcome, Confirmation, DialogueOrchestrator, PendingAction, Session};
