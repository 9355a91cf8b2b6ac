//! The surface a display loop and a remote control talk to: a playlist
//! cursor on the caller's thread plus the scanner thread behind it. With
//! [`ScanMode::External`] there is no scanner thread and the store is only
//! read.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, ScanMode};
use crate::db::Database;
use crate::playlist::{PlaylistCursor, Slide};
use crate::scanner::{ScanControl, Scanner, ScannerHandle};

pub struct Slideshow {
    mode: ScanMode,
    cursor: PlaylistCursor,
    scanner: Option<ScannerHandle>,
}

impl Slideshow {
    /// Open (or create) the store and start scanning. In on-demand mode a
    /// single pass is requested straight away. In external mode nothing is
    /// written; until the daemon has created the schema the playlist is empty.
    pub fn open(config: &Config) -> Result<Self> {
        let db_path = config.db_path();

        let handle = if config.scanner.mode == ScanMode::External {
            info!("store is maintained by another process, not scanning");
            None
        } else {
            let writer = Database::open(&db_path)
                .with_context(|| format!("Failed to open cache {}", db_path.display()))?;
            writer.initialize().context("Failed to initialize cache schema")?;

            let scanner = Scanner::from_config(config, Arc::new(ScanControl::new()));
            let handle = ScannerHandle::spawn(
                scanner,
                writer,
                config.scanner.mode,
                config.scanner.rest_interval(),
                None,
            )
            .context("Failed to start scanner thread")?;
            if config.scanner.mode == ScanMode::OnDemand {
                handle.request_scan();
            }
            Some(handle)
        };

        let reader = Database::open(&db_path)
            .with_context(|| format!("Failed to open cache {}", db_path.display()))?;

        let cursor = PlaylistCursor::new(
            reader,
            config.scanner.root(),
            &config.playlist,
            config.scanner.follow_links,
        );

        info!(db = %db_path.display(), root = %config.scanner.root().display(), "slideshow ready");

        Ok(Self {
            mode: config.scanner.mode,
            cursor,
            scanner: handle,
        })
    }

    pub fn get_next_group(&mut self) -> Slide {
        self.cursor.next()
    }

    pub fn get_previous(&mut self) -> Slide {
        self.cursor.previous()
    }

    /// Rebuild the playlist on the next call; on demand, also rescan.
    pub fn force_reload(&mut self) {
        self.cursor.force_reload();
        if let (ScanMode::OnDemand, Some(scanner)) = (self.mode, &self.scanner) {
            scanner.request_scan();
        }
    }

    /// Hold the scanner between files, e.g. while a transition is running.
    pub fn pause_scanning(&self, paused: bool) {
        if let Some(scanner) = &self.scanner {
            scanner.pause(paused);
        }
    }

    pub fn purge_missing(&self) {
        match &self.scanner {
            Some(scanner) => scanner.request_purge(),
            None => debug!("purge ignored, store is maintained by another process"),
        }
    }

    /// Whether this slideshow runs its own scanner thread.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_some()
    }

    pub fn count(&self) -> usize {
        self.cursor.count()
    }

    pub fn current(&self) -> Option<&Slide> {
        self.cursor.current()
    }

    /// Filter, sort and directory settings.
    pub fn playlist(&mut self) -> &mut PlaylistCursor {
        &mut self.cursor
    }

    /// Stop the scanner, letting the file in flight finish.
    pub fn stop(&mut self) {
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.stop();
        }
        info!("slideshow stopped");
    }
}
