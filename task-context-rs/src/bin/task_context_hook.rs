//! Command-line bridge for hosts that run hooks as external processes
//!
//! Reads `{"hook": "before"|"after", "tool": "...", "payload": {...}}` from
//! stdin and writes the resulting payload to stdout. Diagnostics go to
//! stderr, controlled by `RUST_LOG`.

use anyhow::{Context, Result};
use nexus_task_context::{CallPayload, ProcessExecutor, TaskContextOrchestrator, ToolInvocation};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Hook {
    Before,
    After,
}

#[derive(Debug, Deserialize)]
struct HookRequest {
    hook: Hook,
    #[serde(flatten)]
    invocation: ToolInvocation,
    #[serde(default)]
    payload: CallPayload,
}

fn project_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::args_os().nth(1) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = std::env::var_os("TASK_CONTEXT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    std::env::current_dir().context("Failed to resolve the current directory")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read hook request from stdin")?;
    let request: HookRequest =
        serde_json::from_str(&input).context("Invalid hook request")?;

    let dir = project_dir()?;
    debug!("Running {:?} hook for {} in {}", request.hook, request.invocation.tool, dir.display());

    let executor = Arc::new(ProcessExecutor::new().with_working_dir(&dir));
    let orchestrator = TaskContextOrchestrator::new(&dir, executor);

    let mut payload = request.payload;
    match request.hook {
        Hook::Before => {
            orchestrator.before(&request.invocation, &mut payload).await;
        },
        Hook::After => {
            orchestrator.after(&request.invocation, &payload, None).await;
        },
    }

    let mut output = serde_json::to_vec(&payload)?;
    output.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&output).await?;
    stdout.flush().await?;
    Ok(())
}
