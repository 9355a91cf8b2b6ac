use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framecache::config::Config;
use framecache::db::Database;
use framecache::logging;
use framecache::scanner::{ScanControl, Scanner};
use framecache::{Slide, Slideshow};

struct Args {
    config_path: Option<PathBuf>,
    once: bool,
    purge: bool,
    list: Option<usize>,
    interval: u64,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        once: false,
        purge: false,
        list: None,
        interval: 10,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("framecache {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--once" | "-1" => parsed.once = true,
            "--purge" => parsed.purge = true,
            "--list" | "-l" => {
                match args.get(i + 1).and_then(|n| n.parse().ok()) {
                    Some(n) => parsed.list = Some(n),
                    None => {
                        eprintln!("Error: --list requires a number");
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            "--interval" | "-i" => {
                if let Some(secs) = args.get(i + 1).and_then(|n| n.parse().ok()) {
                    parsed.interval = secs;
                }
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"framecache - photo frame image cache and playlist

USAGE:
    framecache [OPTIONS]

With no mode option, runs a headless frame: the scanner in the background
and one slide printed every interval.

OPTIONS:
    --config, -c PATH   Path to config file
    --once, -1          Scan the picture directory once and exit
    --purge             Remove records of files that no longer exist and exit
    --list, -l N        Scan once, then print the first N slides of the playlist
    --interval, -i N    Seconds between slides (default: 10)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FRAMECACHE_CONFIG   Path to config file (overrides default location)
    FRAMECACHE_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/framecache/config.toml

See also: framecache-daemon --help"#
    );
}

fn print_slide(slide: &Slide) {
    match slide {
        Slide::Images { primary, secondary } => {
            let location = primary.meta.location.as_deref().unwrap_or("");
            match secondary {
                Some(second) => println!(
                    "{} | {}  {}",
                    primary.path.display(),
                    second.path.display(),
                    location
                ),
                None => println!("{}  {}", primary.path.display(), location),
            }
        }
        Slide::NoImages { placeholder } => println!("(no images) {}", placeholder.display()),
    }
}

fn open_store(config: &Config) -> Result<Database> {
    let db = Database::open(&config.db_path())
        .with_context(|| format!("Failed to open cache {}", config.db_path().display()))?;
    db.initialize()?;
    Ok(db)
}

fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::log_dir()));

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if args.once || args.purge || args.list.is_some() {
        let db = open_store(&config)?;
        let mut scanner = Scanner::from_config(&config, Arc::new(ScanControl::new()));

        if args.purge {
            let removed = scanner.purge_missing(&db)?;
            println!("Purged {} record(s)", removed);
            return Ok(());
        }

        let report = scanner.scan(&db, None)?;
        println!(
            "Scanned {}: {} found, {} new, {} updated, {} unchanged, {} failed, {} removed, {} located",
            config.scanner.root().display(),
            report.found,
            report.inserted,
            report.updated,
            report.unchanged,
            report.failed,
            report.removed,
            report.located
        );

        if let Some(n) = args.list {
            let mut cursor = framecache::PlaylistCursor::new(
                db,
                config.scanner.root(),
                &config.playlist,
                config.scanner.follow_links,
            );
            for _ in 0..n {
                print_slide(&cursor.next());
            }
            println!("{} image(s) in playlist", cursor.count());
        }
        return Ok(());
    }

    let mut show = Slideshow::open(&config)?;
    loop {
        print_slide(&show.get_next_group());
        std::thread::sleep(Duration::from_secs(args.interval.max(1)));
    }
}
