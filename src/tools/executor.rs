//! 工具执行器
//!
//! 按动作名找到 ToolSchema 与处理器，先按 schema 修正参数，再在超时内调用处理器；
//! 超时或失败转为 AgentError（ToolTimeout / ...）；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{
    coerce_params, handlers, Action, Approval, ToolContext, ToolRegistry, ToolServices,
};

/// 动作处理器：固定签名 `(已校验参数, 上下文) -> Result`
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<Value, AgentError>;
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    handlers: HashMap<Action, Arc<dyn ActionHandler>>,
    services: Arc<ToolServices>,
    timeout: Duration,
}

impl ToolExecutor {
    /// 注册全部内置处理器
    pub fn new(registry: Arc<ToolRegistry>, services: Arc<ToolServices>, timeout_secs: u64) -> Self {
        let mut executor = Self {
            registry,
            handlers: HashMap::new(),
            services,
            timeout: Duration::from_secs(timeout_secs),
        };
        for action in Action::ALL {
            executor.register(action, handlers::builtin(action));
        }
        executor
    }

    /// 替换某个动作的处理器
    pub fn register(&mut self, action: Action, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action, handler);
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Arc<ToolServices> {
        &self.services
    }

    /// 执行指定工具；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        approval: Approval,
    ) -> Result<Value, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(params);
        let result = self.dispatch(tool_name, params, approval).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(AgentError::UnknownTool(_)) => "unknown_tool",
            Err(AgentError::InvalidParameters { .. }) => "invalid_parameters",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        approval: Approval,
    ) -> Result<Value, AgentError> {
        let action: Action = tool_name
            .parse()
            .map_err(|_| AgentError::UnknownTool(tool_name.to_string()))?;
        let schema = self
            .registry
            .schema_of(action)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;
        let handler = self
            .handlers
            .get(&action)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let params = coerce_params(schema, params)?;
        let ctx = ToolContext::new(Arc::clone(&self.services), approval);
        match timeout(self.timeout, handler.handle(params, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
