//! Log setup.
//!
//! `ROSTERBOARD_LOG=<level>` sends everything at that level to
//! `rosterboard.log` in the temp directory. Without it, CLI commands print
//! warnings and errors to stderr and the dashboard and MCP server stay silent,
//! since both own stdout/stderr.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;

pub const LOG_ENV: &str = "ROSTERBOARD_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Cli,
    /// Terminal dashboard or stdio server.
    Interactive,
}

pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join("rosterboard.log")
}

/// Level named by `ROSTERBOARD_LOG`, if set and valid.
pub fn requested_level(raw: Option<&str>) -> Option<Level> {
    raw?.trim().parse::<Level>().ok()
}

/// Installs the global subscriber. Safe to call more than once.
pub fn init(surface: Surface) {
    let env = std::env::var(LOG_ENV).ok();

    if let Some(level) = requested_level(env.as_deref()) {
        let path = log_file_path();
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_writer(Mutex::new(file))
                    .try_init();
                tracing::info!("rosterboard v{} logging to {}", env!("CARGO_PKG_VERSION"), path.display());
                return;
            }
            Err(e) => eprintln!("Warning: could not open {}: {e}", path.display()),
        }
    }

    if surface == Surface::Cli {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
