//! Scholar - Rust 学术助教智能体
//!
//! 模块划分：
//! - **agent**: 组合根与无头运行时（终端 / HTTP 共用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、对话编排器（意图 → 补全 → 派发 → 记忆）
//! - **dialogue**: 意图识别与槽位抽取、流式事件
//! - **knowledge**: 分块、嵌入检索、文档图存储（内存 / SQLite）、文件入库
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入服务
//! - **lms**: LMS 能力接口与 Moodle REST 客户端
//! - **memory**: 会话内短期对话记忆
//! - **tools**: 动作枚举、参数 schema、注册表、执行器与各动作处理器

pub mod agent;
pub mod config;
pub mod core;
pub mod dialogue;
pub mod knowledge;
pub mod llm;
pub mod lms;
pub mod memory;
pub mod observability;
pub mod tools;

pub use agent::AgentComponents;
pub use core::{AgentError, AgentOutcome, DialogueOrchestrator, Session};
