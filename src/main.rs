//! Scholar - 学术助教智能体
//!
//! 入口：初始化日志、按配置构建 Agent 组件，并在终端逐行对话。
//! 斜杠命令：/clear /memory /tools /confirm /cancel /ingest <path> /usage /quit

use std::path::PathBuf;

use anyhow::Context;
use scholar::agent::{confirm_action, process_message, AgentComponents};
use scholar::config::load_config;
use scholar::core::{Confirmation, Session};
use scholar::dialogue::RequestHints;
use scholar::memory::NO_HISTORY;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "Commands: /clear /memory /tools /confirm /cancel /ingest <path> /usage /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scholar::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let components = AgentComponents::from_config(cfg).context("Failed to create agent")?;
    let mut session = components.new_session();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(format!("Scholar academic assistant. {HELP}\n").as_bytes())
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let reply = match input {
            "/quit" | "/exit" => break,
            "/help" => HELP.to_string(),
            "/clear" => {
                session.clear();
                "Conversation history cleared.".to_string()
            }
            "/memory" => memory_dump(&session),
            "/tools" => components.registry().format_for_prompt(),
            "/usage" => {
                let (prompt, completion, total) = components.llm.token_usage();
                format!("Tokens: prompt {prompt}, completion {completion}, total {total}")
            }
            "/confirm" | "/cancel" => {
                let confirmation = Confirmation {
                    confirmed: input == "/confirm",
                    original_request: None,
                };
                confirm_action(&components, &mut session, confirmation)
                    .await
                    .reply()
            }
            _ if input.starts_with("/ingest") => ingest(&components, input["/ingest".len()..].trim()).await,
            _ => process_message(&components, &mut session, input, &RequestHints::default())
                .await
                .reply(),
        };
        stdout.write_all(format!("{reply}\n").as_bytes()).await?;
    }
    Ok(())
}

fn memory_dump(session: &Session) -> String {
    let history = session.memory.get_history();
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }
    history
        .iter()
        .map(|m| format!("[{}] {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn ingest(components: &AgentComponents, path: &str) -> String {
    if path.is_empty() {
        return "Usage: /ingest <path>".to_string();
    }
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => return format!("Could not read {path}: {e}"),
    };
    let filename = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    match components.ingestor.ingest_bytes(&bytes, filename.as_deref()).await {
        Ok(report) => format!(
            "Added \"{}\" ({} chunks, id {}).",
            report.title, report.chunk_count, report.doc_id
        ),
        Err(e) => format!("Could not add {path}: {e}"),
    }
}
