//! The scanner thread: the store's only writer.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::{ScanControl, ScanProgress, Scanner};
use crate::config::ScanMode;
use crate::db::Database;

/// How often an idle worker checks for cancellation.
const IDLE_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    /// Run a pass as soon as the current one (if any) finishes.
    Scan,
    /// Remove records of files that no longer exist anywhere.
    Purge,
}

/// Owner's side of a running scanner thread. Dropping it stops the thread.
pub struct ScannerHandle {
    control: Arc<ScanControl>,
    commands: mpsc::Sender<ScanCommand>,
    thread: Option<JoinHandle<()>>,
}

impl ScannerHandle {
    /// Start the worker. In continuous mode the first pass begins at once;
    /// on demand it waits for [`ScannerHandle::request_scan`].
    pub fn spawn(
        scanner: Scanner,
        db: Database,
        mode: ScanMode,
        rest_interval: Duration,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
    ) -> io::Result<Self> {
        let control = scanner.control();
        let (tx, rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("framecache-scanner".to_string())
            .spawn(move || {
                let mut worker = Worker {
                    scanner,
                    db,
                    mode,
                    rest_interval,
                    progress_tx,
                    commands: rx,
                };
                worker.run();
            })?;

        Ok(Self {
            control,
            commands: tx,
            thread: Some(thread),
        })
    }

    pub fn request_scan(&self) {
        let _ = self.commands.send(ScanCommand::Scan);
    }

    pub fn request_purge(&self) {
        let _ = self.commands.send(ScanCommand::Purge);
    }

    /// Suspend between files; the file in flight completes first.
    pub fn pause(&self, paused: bool) {
        self.control.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Block until the worker exits on its own (it never does in
    /// continuous mode unless the thread panics).
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("scanner thread panicked");
            }
        }
    }

    /// Cancel and wait for the thread to exit. The store is left consistent:
    /// every write is its own transaction.
    pub fn stop(&mut self) {
        self.control.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("scanner thread panicked");
            }
        }
    }
}

impl Drop for ScannerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    scanner: Scanner,
    db: Database,
    mode: ScanMode,
    rest_interval: Duration,
    progress_tx: Option<mpsc::Sender<ScanProgress>>,
    commands: mpsc::Receiver<ScanCommand>,
}

impl Worker {
    fn run(&mut self) {
        let control = self.scanner.control();
        info!(mode = ?self.mode, "scanner started");

        let mut pending_scan = self.mode == ScanMode::Continuous;
        while !control.is_cancelled() {
            if pending_scan {
                pending_scan = false;
                self.pass();
            }
            match self.wait_for_work(&control) {
                Some(ScanCommand::Scan) => pending_scan = true,
                Some(ScanCommand::Purge) => self.purge(),
                None => break,
            }
        }

        info!("scanner stopped");
    }

    fn pass(&mut self) {
        match self.scanner.scan(&self.db, self.progress_tx.as_ref()) {
            Ok(report) => debug!(?report, "pass finished"),
            Err(e) => {
                // Retried after the rest interval.
                error!(error = %e, "scan pass aborted");
                if let Some(tx) = &self.progress_tx {
                    let _ = tx.send(ScanProgress::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn purge(&mut self) {
        if let Err(e) = self.scanner.purge_missing(&self.db) {
            error!(error = %e, "purge failed");
        }
    }

    /// Next thing to do. A continuous worker treats the end of its rest
    /// interval as a scan request. `None` means shut down.
    fn wait_for_work(&self, control: &ScanControl) -> Option<ScanCommand> {
        let deadline = match self.mode {
            ScanMode::Continuous => Some(Instant::now() + self.rest_interval),
            ScanMode::OnDemand | ScanMode::External => None,
        };

        loop {
            if control.is_cancelled() {
                return None;
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Some(ScanCommand::Scan);
                    }
                    remaining.min(IDLE_POLL)
                }
                None => IDLE_POLL,
            };

            match self.commands.recv_timeout(timeout) {
                Ok(command) => return Some(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
