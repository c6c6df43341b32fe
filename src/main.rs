mod attendance;
mod auth;
mod db;
mod ipc;
mod store;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attendanced")]
#[command(about = "Timetable attendance sidecar speaking line-delimited JSON over stdio")]
struct Cli {
    /// Workspace directory to open at startup (same as a `workspace.select` request)
    #[arg(long, env = "ATTENDANCED_WORKSPACE")]
    workspace: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // stdout carries responses; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("attendanced=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = cli.workspace {
        state.db = Some(db::open_db(&path)?);
        tracing::info!(workspace = %path.display(), "workspace opened from command line");
        state.workspace = Some(path);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    Ok(())
}
