//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCHOLAR__*` 覆盖（双下划线表示嵌套，如 `SCHOLAR__LMS__TOKEN=...`），
//! 最后兼容旧的扁平变量（`MOODLE_BASE_URL`、`MOODLE_TOKEN`、`EMBEDDING_MODEL`、`GRAPH_STORE_URI`、
//! `CHUNK_SIZE`、`CHUNK_OVERLAP`），仅在对应的 `SCHOLAR__*` 未设置时生效。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::knowledge::ChunkingConfig;

const ENV_PREFIX: &str = "SCHOLAR";

/// 旧变量名 → 配置键
const LEGACY_VARS: &[(&str, &str)] = &[
    ("MOODLE_BASE_URL", "lms.base_url"),
    ("MOODLE_TOKEN", "lms.token"),
    ("EMBEDDING_MODEL", "embedding.model"),
    ("GRAPH_STORE_URI", "knowledge.store_uri"),
    ("CHUNK_SIZE", "knowledge.chunk_size"),
    ("CHUNK_OVERLAP", "knowledge.chunk_overlap"),
];

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub knowledge: KnowledgeSection,
    pub lms: LmsSection,
    pub tools: ToolsSection,
    pub server: ServerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话历史保留轮数（记忆容量为其两倍条消息）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    5
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// [knowledge] 段：图存储位置、分块与检索参数
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeSection {
    /// `memory://` 或 `sqlite://<path>`
    #[serde(default = "default_store_uri")]
    pub store_uri: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_retrieve_top_k")]
    pub retrieve_top_k: usize,
    #[serde(default = "default_qa_top_k")]
    pub qa_top_k: usize,
    /// 每次检索最多取出的候选分块数；未设置则全量扫描
    pub candidate_limit: Option<usize>,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            store_uri: default_store_uri(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            retrieve_top_k: default_retrieve_top_k(),
            qa_top_k: default_qa_top_k(),
            candidate_limit: None,
        }
    }
}

impl KnowledgeSection {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_store_uri() -> String {
    "memory://".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_retrieve_top_k() -> usize {
    2
}

fn default_qa_top_k() -> usize {
    1
}

/// [lms] 段：Moodle REST 端点（含 server.php）与令牌；未配置 base_url 时使用空实现
#[derive(Debug, Clone, Deserialize)]
pub struct LmsSection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_lms_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LmsSection {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: default_lms_timeout_secs(),
        }
    }
}

fn default_lms_timeout_secs() -> u64 {
    30
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// [server] 段：Web 服务监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 会话表上限
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// 会话空闲多久后回收（秒）
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_sessions() -> usize {
    1000
}

fn default_session_idle_secs() -> u64 {
    3600
}

impl AppConfig {
    /// 启动前校验：分块重叠必须小于分块大小，记忆轮数与 top_k 必须为正
    pub fn validate(&self) -> Result<(), AgentError> {
        let k = &self.knowledge;
        if k.chunk_size == 0 || k.chunk_overlap >= k.chunk_size {
            return Err(AgentError::ConfigError(format!(
                "knowledge.chunk_overlap ({}) must be smaller than knowledge.chunk_size ({})",
                k.chunk_overlap, k.chunk_size
            )));
        }
        if self.app.max_context_turns == 0 {
            return Err(AgentError::ConfigError(
                "app.max_context_turns must be at least 1".into(),
            ));
        }
        if k.retrieve_top_k == 0 || k.qa_top_k == 0 {
            return Err(AgentError::ConfigError(
                "knowledge.retrieve_top_k and knowledge.qa_top_k must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 SCHOLAR__* 与旧变量可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 SCHOLAR__*（双下划线表示嵌套键）
/// 4. 旧的扁平变量填补仍未被 SCHOLAR__* 设置的键
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    build_config(config_path, std::env::vars().collect())
}

fn build_config(
    config_path: Option<PathBuf>,
    env: HashMap<String, String>,
) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, skipped");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(Some(env.clone())),
    );

    for (legacy, key) in LEGACY_VARS {
        let scoped = format!("{ENV_PREFIX}__{}", key.replace('.', "__").to_uppercase());
        if env.contains_key(&scoped) {
            continue;
        }
        if let Some(value) = env.get(*legacy).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(var = legacy, key, "Applying legacy environment variable");
            builder = builder.set_override(*key, value.trim().to_string())?;
        }
    }

    builder.build()?.try_deserialize()
}
