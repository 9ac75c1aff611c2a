mod archive;
mod commentary;
mod config;
mod error;
mod history;
mod identity;
mod ipc;
mod ledger;
mod logging;
mod model;
mod reconcile;
mod roster;
mod session;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use tracing::{error, info};

fn main() {
    logging::init();
    let config = config::Config::from_env();

    let commentary = match commentary::OpenAiCommentary::new(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };
    let mut state = ipc::AppState {
        session: session::Session::new(&config),
        commentary: Box::new(commentary),
        request_delay: Duration::from_millis(config.request_delay_ms),
    };
    info!(version = env!("CARGO_PKG_VERSION"), "gradingd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
