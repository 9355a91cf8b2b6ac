pub mod change_detection;
pub mod discovery;
pub mod metadata;
pub mod worker;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, ScannerConfig};
use crate::db::{Database, UpsertOutcome};
use crate::error::StorageResult;
use crate::geo::{GeoCache, GeoResolver, NominatimResolver};

use change_detection::{classify, fingerprint, FileChange};
pub use discovery::discover_images;
pub use metadata::{ExifExtractor, MetadataExtractor};
pub use worker::{ScanCommand, ScannerHandle};

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_files: usize },
    Scanning { current: usize, total: usize, path: String },
    Completed(ScanReport),
    Error { message: String },
}

/// Counts for one pass over the picture directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub found: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub removed: usize,
    pub located: usize,
    /// The pass stopped early; nothing was removed.
    pub cancelled: bool,
}

impl ScanReport {
    /// Whether the pass wrote anything to the store.
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.removed + self.located > 0
    }
}

/// Pause and cancel flags shared between the scanner thread and its owner.
#[derive(Debug, Default)]
pub struct ScanControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block while paused. Returns false once cancelled.
    pub fn wait_until_runnable(&self, poll: Duration) -> bool {
        while self.is_paused() && !self.is_cancelled() {
            std::thread::sleep(poll);
        }
        !self.is_cancelled()
    }
}

pub struct Scanner {
    config: ScannerConfig,
    extractor: Box<dyn MetadataExtractor>,
    geo: Option<GeoCache<Box<dyn GeoResolver>>>,
    control: Arc<ScanControl>,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        extractor: Box<dyn MetadataExtractor>,
        geo: Option<GeoCache<Box<dyn GeoResolver>>>,
        control: Arc<ScanControl>,
    ) -> Self {
        Self {
            config,
            extractor,
            geo,
            control,
        }
    }

    /// EXIF extraction, plus Nominatim lookups when `geo.enabled`.
    pub fn from_config(config: &Config, control: Arc<ScanControl>) -> Self {
        let geo = if config.geo.enabled {
            let resolver: Box<dyn GeoResolver> = Box::new(NominatimResolver::new(&config.geo));
            Some(GeoCache::new(resolver, config.geo.precision))
        } else {
            None
        };
        Self::new(config.scanner.clone(), Box::new(ExifExtractor), geo, control)
    }

    pub fn control(&self) -> Arc<ScanControl> {
        self.control.clone()
    }

    /// Walk the picture directory once, bringing the store in line with it.
    ///
    /// Unchanged files are not re-read. Records are removed only at the end
    /// of a full pass; a cancelled pass leaves them alone.
    pub fn scan(
        &mut self,
        db: &Database,
        progress_tx: Option<&mpsc::Sender<ScanProgress>>,
    ) -> StorageResult<ScanReport> {
        let root = self.config.root();
        let image_paths =
            discover_images(&root, &self.config.image_extensions, self.config.follow_links)?;

        let total = image_paths.len();
        if let Some(tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started { total_files: total });
        }

        let stored = db.fingerprints()?;
        let mut seen = HashSet::with_capacity(total);
        let mut report = ScanReport {
            found: total,
            ..Default::default()
        };

        for (index, path) in image_paths.into_iter().enumerate() {
            if !self.control.wait_until_runnable(self.config.pause_poll()) {
                info!(processed = index, total, "scan cancelled");
                report.cancelled = true;
                return Ok(report);
            }

            if let Some(tx) = progress_tx {
                let _ = tx.send(ScanProgress::Scanning {
                    current: index + 1,
                    total,
                    path: path.to_string_lossy().to_string(),
                });
            }

            let current = match fingerprint(&path) {
                Ok(mtime) => mtime,
                Err(e) => {
                    // Vanished between the walk and now.
                    debug!(path = %path.display(), error = %e, "cannot stat");
                    report.failed += 1;
                    continue;
                }
            };
            seen.insert(path.clone());

            if classify(stored.get(&path).copied(), current) == FileChange::Unchanged {
                report.unchanged += 1;
                continue;
            }

            match self.scan_file(db, &path, current) {
                Ok(UpsertOutcome::Inserted(_)) => report.inserted += 1,
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Ok(UpsertOutcome::Unchanged(_)) => report.unchanged += 1,
                Err(ScanFileError::Storage(e)) => return Err(e),
                Err(ScanFileError::Extraction(e)) => {
                    warn!(error = %e, "skipping file");
                    report.failed += 1;
                    if let Some(tx) = progress_tx {
                        let _ = tx.send(ScanProgress::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        report.removed = db.remove_missing(&root, &seen)?;
        report.located = self.backfill_locations(db)?;

        if report.has_changes() {
            info!(?report, "scan complete");
        } else {
            debug!(?report, "scan complete, no changes");
        }

        if let Some(tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed(report.clone()));
        }

        Ok(report)
    }

    fn scan_file(
        &mut self,
        db: &Database,
        path: &Path,
        last_modified: f64,
    ) -> Result<UpsertOutcome, ScanFileError> {
        let mut meta = self
            .extractor
            .extract(path)
            .map_err(ScanFileError::Extraction)?;

        if let (Some(geo), Some(lat), Some(lon)) = (self.geo.as_mut(), meta.latitude, meta.longitude) {
            meta.location = geo.resolve(lat, lon);
        }

        db.upsert(path, last_modified, &meta)
            .map_err(ScanFileError::Storage)
    }

    /// Resolve records whose earlier lookup failed or predates geocoding.
    fn backfill_locations(&mut self, db: &Database) -> StorageResult<usize> {
        let geo = match self.geo.as_mut() {
            Some(geo) => geo,
            None => return Ok(0),
        };

        let mut located = 0;
        for (file_id, lat, lon) in db.records_missing_location()? {
            if self.control.is_cancelled() {
                break;
            }
            if let Some(location) = geo.resolve(lat, lon) {
                db.set_location(file_id, &location)?;
                located += 1;
            }
        }
        Ok(located)
    }

    /// Delete every record whose file is no longer a regular file, wherever
    /// it lives. Covers records left behind when the picture directory moved.
    pub fn purge_missing(&self, db: &Database) -> StorageResult<usize> {
        let gone: Vec<i64> = db
            .all_paths()?
            .into_iter()
            .filter(|(_, path)| !path.is_file())
            .map(|(file_id, _)| file_id)
            .collect();
        let removed = db.delete_ids(&gone)?;
        if removed > 0 {
            info!(removed, "purged records of missing files");
        }
        Ok(removed)
    }
}

enum ScanFileError {
    Extraction(crate::error::ExtractionError),
    Storage(crate::error::StorageError),
}
