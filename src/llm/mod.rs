//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入服务、结构化输出解析

pub mod deepseek;
pub mod embedding;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use embedding::{
    create_embedder_from_config, EmbeddingError, EmbeddingProvider, OpenAiEmbedder,
};
pub use mock::{MockEmbedder, MockLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use structured::{parse_structured, Structured};
pub use traits::{LlmClient, LlmError, JSON_ONLY_INSTRUCTION};
