//! 工具层：动作枚举、参数 schema、注册表、参数修正、执行器与各动作处理器

pub mod action;
pub mod context;
pub mod executor;
pub mod handlers;
pub mod params;
pub mod registry;
pub mod schema;

pub use action::Action;
pub use context::{Approval, ToolContext, ToolServices};
pub use executor::{ActionHandler, ToolExecutor};
pub use params::{coerce_params, parse_params};
pub use registry::{ParamKind, ParamSpec, ToolRegistry, ToolSchema};
