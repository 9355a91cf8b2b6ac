//! Framecache daemon: keeps the image cache in step with the picture
//! directory for a frame running in another process.
//!
//! The frame opens the same SQLite file read-side; the daemon is its only
//! writer.
//!
//! ## Usage
//!
//! ```bash
//! framecache-daemon              # Scan continuously in the foreground
//! framecache-daemon --once       # One pass, then exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use framecache::config::{Config, ScanMode};
use framecache::db::Database;
use framecache::logging;
use framecache::scanner::{ScanControl, Scanner, ScannerHandle};

struct DaemonConfig {
    /// Seconds between passes; overrides the config file when set.
    rest_interval: Option<u64>,
    once: bool,
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let daemon_config = parse_args();

    logging::init_stderr()?;

    info!("Framecache daemon starting...");

    let config = match daemon_config.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let db = Database::open(&config.db_path())
        .with_context(|| format!("Failed to open cache {}", config.db_path().display()))?;
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path());

    let mut scanner = Scanner::from_config(&config, Arc::new(ScanControl::new()));

    if daemon_config.once {
        info!("Running in single-shot mode");
        let report = scanner.scan(&db, None)?;
        info!(?report, "Pass complete");
        return Ok(());
    }

    let rest = daemon_config
        .rest_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.scanner.rest_interval());
    info!("Running in daemon mode, resting {:?} between passes", rest);

    let handle = ScannerHandle::spawn(scanner, db, ScanMode::Continuous, rest, None)
        .context("Failed to start scanner thread")?;
    handle.join();

    info!("Framecache daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DaemonConfig {
        rest_interval: None,
        once: false,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                config.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(interval) = args[i + 1].parse() {
                        config.rest_interval = Some(interval);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_help() {
    println!(
        r#"framecache-daemon - Background scanner for the framecache image cache

USAGE:
    framecache-daemon [OPTIONS]

OPTIONS:
    --once, -1          Scan once and exit
    --interval, -i N    Seconds to rest between passes (default: from config)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    FRAMECACHE_CONFIG   Path to config file (overrides default location)
    FRAMECACHE_LOG      Log filter (trace, debug, info, warn, error)
"#
    );
}
