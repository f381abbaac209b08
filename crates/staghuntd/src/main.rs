//! Stag hunt front end.
//!
//! Plays a session in the terminal, or with `--serve ADDR` accepts TCP
//! clients speaking JSON lines, one independent session per client.
//!
//! Session files go to the OS data dir unless `--data-dir` says otherwise:
//! - Linux: ~/.local/share/staghunt/sessions/
//! - Windows: %APPDATA%\staghunt\sessions\
//! - MacOS: ~/Library/Application Support/staghunt/sessions/

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod config;
mod input;
mod paths;
mod render;
mod serve;
mod store;
mod terminal;

use config::{ConfigError, DaemonConfig, USAGE};
use paths::AppPaths;
use serve::ServerCtx;
use store::DirStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they do not interleave with the board.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{USAGE}");
        return Ok(());
    }

    let cfg = match DaemonConfig::resolve(&args, |k| std::env::var(k).ok()) {
        Ok(cfg) => cfg,
        Err(ConfigError::Usage(msg)) => {
            eprintln!("{msg}\n\n{USAGE}");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    let paths = AppPaths::new(cfg.data_dir.clone())?;
    let store = DirStore::open(paths)?;
    info!(
        tier = %cfg.session.tier,
        episodes = cfg.session.episodes,
        rows = cfg.session.rows,
        cols = cfg.session.cols,
        dir = %store.paths().data_dir().display(),
        "configuration resolved"
    );

    match cfg.serve.clone() {
        Some(addr) => {
            let listener = TcpListener::bind(&addr).await?;
            info!("Stag hunt server listening on {}", addr);
            let ctx = Arc::new(ServerCtx {
                cfg: cfg.session,
                move_timeout: cfg.move_timeout,
                store,
            });
            serve::serve(listener, ctx).await?;
        }
        None => {
            let report = terminal::run(cfg.session, cfg.move_timeout, store)
                .await
                .map_err(|e| e as Box<dyn std::error::Error>)?;
            info!(
                session = report.session_id,
                completed = report.completed(),
                "session finished"
            );
        }
    }
    Ok(())
}
