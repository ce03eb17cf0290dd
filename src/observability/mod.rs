//! 可观测性：tracing 订阅器初始化
//!
//! 日志写到 stderr，终端对话的 stdout 只输出回复。级别默认 info，可用 `RUST_LOG` 覆盖。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
