//! Headless Agent 运行时（组合根）
//!
//! `AgentComponents::from_config` 一次性构建文本生成客户端、LMS 客户端、知识库、工具注册表与执行器，
//! 显式注入编排器；没有模块级单例。终端对话与 HTTP 服务都通过这里的函数处理用户输入。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::core::{AgentError, AgentOutcome, Confirmation, DialogueOrchestrator, Session};
use crate::dialogue::{outcome_events, DialogueEvent, EventEmitter, RequestHints};
use crate::knowledge::{open_backend, FileIngestor, IngestReport, KnowledgeError, KnowledgeStore};
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, EmbeddingProvider, LlmClient, MockEmbedder,
    MockLlmClient, OpenAiClient,
};
use crate::lms::{LmsClient, MoodleClient, NoopLmsClient};
use crate::tools::{Approval, ToolExecutor, ToolRegistry, ToolServices};

/// 无嵌入服务时的本地哈希词袋维度
const FALLBACK_EMBEDDING_DIMS: usize = 256;

const DEFAULT_MAX_SESSIONS: usize = 1000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        && (provider == "deepseek" || std::env::var("OPENAI_API_KEY").is_err());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";
    let timeout = cfg.llm.timeouts.request;

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| crate::llm::DEEPSEEK_CHAT.to_string());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)).with_request_timeout(timeout))
    } else if use_openai {
        let model = cfg.llm.model.clone();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )
            .with_request_timeout(timeout),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

fn create_embedder(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    match create_embedder_from_config(cfg.embedding.base_url.as_deref(), &cfg.embedding.model, None) {
        Some(e) => {
            tracing::info!("Using embedding model {}", cfg.embedding.model);
            e
        }
        None => {
            tracing::warn!("No embedding API key, using local hashed bag-of-words embeddings");
            Arc::new(MockEmbedder::new(FALLBACK_EMBEDDING_DIMS))
        }
    }
}

fn create_lms(cfg: &AppConfig) -> Arc<dyn LmsClient> {
    match cfg.lms.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            if cfg.lms.token.as_deref().unwrap_or("").is_empty() {
                tracing::warn!("LMS base URL set without a token; requests will be rejected");
            }
            tracing::info!(url, "Using Moodle LMS");
            Arc::new(MoodleClient::new(
                url,
                cfg.lms.token.clone().unwrap_or_default(),
                cfg.lms.timeout_secs,
            ))
        }
        None => {
            tracing::warn!("No LMS configured, LMS capabilities are unsupported");
            Arc::new(NoopLmsClient)
        }
    }
}

/// 预构建的 Agent 组件，可多会话共享
pub struct AgentComponents {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub lms: Arc<dyn LmsClient>,
    pub knowledge: Arc<KnowledgeStore>,
    pub ingestor: FileIngestor,
    pub orchestrator: DialogueOrchestrator,
}

impl AgentComponents {
    /// 按配置创建全部协作方
    pub fn from_config(cfg: AppConfig) -> Result<Self, AgentError> {
        cfg.validate()?;
        let llm = create_llm_from_config(&cfg);
        let embedder = create_embedder(&cfg);
        let lms = create_lms(&cfg);
        Self::with_parts(cfg, llm, embedder, lms)
    }

    /// 用给定的协作方组装（测试与嵌入场景）
    pub fn with_parts(
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        lms: Arc<dyn LmsClient>,
    ) -> Result<Self, AgentError> {
        cfg.validate()?;
        let backend = open_backend(&cfg.knowledge.store_uri)?;
        let knowledge = Arc::new(
            KnowledgeStore::new(backend, embedder, cfg.knowledge.chunking())?
                .with_llm(llm.clone())
                .with_candidate_limit(cfg.knowledge.candidate_limit),
        );
        let services = ToolServices::new(llm.clone(), lms.clone())
            .with_knowledge(knowledge.clone())
            .with_top_k(cfg.knowledge.retrieve_top_k, cfg.knowledge.qa_top_k);
        let executor = ToolExecutor::new(
            Arc::new(ToolRegistry::builtin()),
            Arc::new(services),
            cfg.tools.tool_timeout_secs,
        );
        let orchestrator = DialogueOrchestrator::new(llm.clone(), Arc::new(executor));
        tracing::info!(
            tools = orchestrator.registry().tool_names().len(),
            store = %cfg.knowledge.store_uri,
            "Agent components ready"
        );

        Ok(Self {
            ingestor: FileIngestor::new(knowledge.clone()),
            config: cfg,
            llm,
            lms,
            knowledge,
            orchestrator,
        })
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.config.app.max_context_turns)
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.orchestrator.registry()
    }
}

/// 处理单条用户消息，返回终态信封
pub async fn process_message(
    components: &AgentComponents,
    session: &mut Session,
    user_input: &str,
    hints: &RequestHints,
) -> AgentOutcome {
    components.orchestrator.handle(session, user_input, hints).await
}

/// 流式处理单条用户消息：先推送 status，再推送结果分解出的事件。
/// 消费方在识别前断开时不做任何处理并返回 None。
pub async fn process_message_stream(
    components: &AgentComponents,
    session: &mut Session,
    user_input: &str,
    hints: &RequestHints,
    emitter: &EventEmitter,
) -> Option<AgentOutcome> {
    if !emitter.emit(DialogueEvent::status("Analyzing your request...")).await {
        return None;
    }
    let outcome = components.orchestrator.handle(session, user_input, hints).await;
    emitter.emit_all(outcome_events(&outcome)).await;
    Some(outcome)
}

/// 两阶段提交的第二阶段
pub async fn confirm_action(
    components: &AgentComponents,
    session: &mut Session,
    confirmation: Confirmation,
) -> AgentOutcome {
    components.orchestrator.confirm(session, confirmation).await
}

/// 上传文件入库（base64），并以事件流告知结果
pub async fn ingest_file_stream(
    components: &AgentComponents,
    payload: &str,
    filename: Option<&str>,
    emitter: &EventEmitter,
) -> Result<IngestReport, KnowledgeError> {
    emitter.emit(DialogueEvent::status("Processing uploaded file...")).await;
    match components.ingestor.ingest_base64(payload, filename).await {
        Ok(report) => {
            let text = format!(
                "Added \"{}\" to the knowledge base ({} chunks).",
                report.title, report.chunk_count
            );
            emitter
                .emit_all([
                    DialogueEvent::AnswerChunk { text },
                    DialogueEvent::Complete {
                        status: "success".into(),
                        details: serde_json::to_value(&report).unwrap_or(Value::Null),
                    },
                ])
                .await;
            Ok(report)
        }
        Err(e) => {
            tracing::warn!(error = %e, "File ingestion failed");
            emitter
                .emit(DialogueEvent::Error {
                    text: format!("Could not add the file: {e}"),
                })
                .await;
            Err(e)
        }
    }
}

/// 绕过意图识别直接执行工具；发帖类工具仅在 confirmed 时发布
pub async fn direct_action(
    components: &AgentComponents,
    action: &str,
    params: &Map<String, Value>,
    confirmed: bool,
) -> Result<Value, AgentError> {
    let approval = if confirmed {
        Approval::Confirmed { draft: None }
    } else {
        Approval::Pending
    };
    components
        .orchestrator
        .executor()
        .execute(action, params, approval)
        .await
}

/// 按 id 隔离的会话表；每个会话单独加锁，不同会话互不阻塞
///
/// 空闲超过 `idle_ttl` 的会话在下一次 `get` 时回收；达到 `max_sessions` 时先淘汰最久未用的会话。
/// 正在被请求持有的会话不会被回收。
pub struct SessionStore {
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

struct SessionSlot {
    session: Arc<tokio::sync::Mutex<Session>>,
    last_used: Instant,
}

impl SessionSlot {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_ttl: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_limits(mut self, max_sessions: usize, idle_ttl: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.idle_ttl = idle_ttl;
        self
    }

    /// 获取（不存在则创建）指定会话
    pub fn get(&self, id: &str) -> Arc<tokio::sync::Mutex<Session>> {
        let mut map = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(slot) = map.get_mut(id) {
            slot.last_used = now;
            return slot.session.clone();
        }

        let before = map.len();
        map.retain(|_, slot| slot.in_use() || now.duration_since(slot.last_used) < self.idle_ttl);
        while map.len() >= self.max_sessions {
            let oldest = map
                .iter()
                .filter(|(_, slot)| !slot.in_use())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    map.remove(&k);
                }
                None => break,
            }
        }
        if map.len() < before {
            tracing::debug!(evicted = before - map.len(), remaining = map.len(), "Sessions evicted");
        }

        let session = Arc::new(tokio::sync::Mutex::new(Session::new(self.max_turns)));
        map.insert(
            id.to_string(),
            SessionSlot {
                session: session.clone(),
                last_used: now,
            },
        );
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
