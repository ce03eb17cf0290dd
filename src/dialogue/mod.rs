//! 对话层：意图识别与槽位抽取、流式事件

pub mod events;
pub mod intent;

pub use events::{outcome_events, split_chunks, DialogueEvent, EventEmitter};
pub use intent::{sanitize, IntentDecision, IntentResolver, RequestHints, ERROR_INTENT};
