//! The playlist cursor the display loop drains one slot at a time.
//!
//! Runs on the caller's thread. It only ever reads the store; the scanner
//! may be writing concurrently through its own connection.

use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::PlaylistConfig;
use crate::db::{Column, Database, ImageRecord, Predicate};
use crate::error::FilterSyntaxError;
use crate::selection::{CalendarMode, Group, SelectionEngine, SelectionPolicy};

/// What the display should show next.
#[derive(Debug, Clone, PartialEq)]
pub enum Slide {
    Images {
        primary: ImageRecord,
        secondary: Option<ImageRecord>,
    },
    NoImages {
        placeholder: PathBuf,
    },
}

impl Slide {
    pub fn primary(&self) -> Option<&ImageRecord> {
        match self {
            Slide::Images { primary, .. } => Some(primary),
            Slide::NoImages { .. } => None,
        }
    }

    pub fn secondary(&self) -> Option<&ImageRecord> {
        match self {
            Slide::Images { secondary, .. } => secondary.as_ref(),
            Slide::NoImages { .. } => None,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Local> + Send>;

pub struct PlaylistCursor {
    db: Database,
    engine: SelectionEngine,
    policy: SelectionPolicy,
    groups: Vec<Group>,
    /// Index of the group the next call to `next` reads.
    position: usize,
    run_throughs: u32,
    reshuffle_num: u32,
    reload: bool,
    reshuffle_pending: bool,
    /// Number of times the playlist has been rebuilt.
    generation: u64,
    current: Option<(usize, Slide)>,
    placeholder: PathBuf,
    deleted_pictures: PathBuf,
    follow_links: bool,
    clock: Clock,
}

impl PlaylistCursor {
    pub fn new(db: Database, root: PathBuf, config: &PlaylistConfig, follow_links: bool) -> Self {
        Self::with_engine(db, SelectionEngine::new(root), config, follow_links)
    }

    pub fn with_engine(
        db: Database,
        engine: SelectionEngine,
        config: &PlaylistConfig,
        follow_links: bool,
    ) -> Self {
        Self {
            db,
            engine,
            policy: SelectionPolicy::from_config(config),
            groups: Vec::new(),
            position: 0,
            run_throughs: 0,
            reshuffle_num: config.reshuffle_num,
            reload: true,
            reshuffle_pending: false,
            generation: 0,
            current: None,
            placeholder: crate::config::expand_home(&config.no_files_img),
            deleted_pictures: crate::config::expand_home(&config.deleted_pictures),
            follow_links,
            clock: Box::new(Local::now),
        }
    }

    /// Replace the source of "today" used by calendar modes and recency.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn reload_now(&mut self) {
        let now = (self.clock)();
        self.groups = self.engine.select(&self.db, &self.policy, &now);
        self.position = 0;
        self.run_throughs = 0;
        self.reload = false;
        self.reshuffle_pending = false;
        self.generation += 1;
        info!(groups = self.groups.len(), generation = self.generation, "playlist reloaded");
    }

    fn no_images(&mut self) -> Slide {
        self.reload = true;
        let slide = Slide::NoImages {
            placeholder: self.placeholder.clone(),
        };
        self.current = None;
        slide
    }

    /// The next slot, skipping images whose files have disappeared.
    pub fn next(&mut self) -> Slide {
        if self.reshuffle_pending {
            self.reshuffle_pending = false;
            self.reload = true;
        }
        if self.reload {
            self.reload_now();
        }

        let len = self.groups.len();
        if len == 0 || self.groups == [Group::NoImages] {
            return self.no_images();
        }

        let mut missing = 0;
        loop {
            if self.position >= len {
                self.run_throughs += 1;
                if self.policy.shuffle() && self.run_throughs >= self.reshuffle_num.max(1) {
                    // Rebuilt on the following call; this one starts the old order again.
                    self.reshuffle_pending = true;
                }
                self.position = 0;
            }

            let index = self.position;
            self.position += 1;

            if let Some(slide) = self.materialize(self.groups[index]) {
                self.current = Some((index, slide.clone()));
                return slide;
            }

            missing += 1;
            if missing >= len {
                warn!(missing, "every image in the playlist is missing");
                return self.no_images();
            }
        }
    }

    /// Step back to the slot shown before the current one and return it.
    ///
    /// Slots whose files have gone are stepped over. During the first
    /// traversal there is nothing before the first slot, so it stays there;
    /// later traversals wrap around to the end.
    pub fn previous(&mut self) -> Slide {
        let len = self.groups.len();
        if self.reload || self.reshuffle_pending || self.position == 0 || len == 0 {
            return self.next();
        }

        let shown = self.position - 1;
        let mut index = shown;
        for _ in 1..len {
            index = if index > 0 {
                index - 1
            } else if self.run_throughs == 0 {
                break;
            } else {
                len - 1
            };
            if let Some(slide) = self.materialize(self.groups[index]) {
                self.position = index + 1;
                self.current = Some((index, slide.clone()));
                return slide;
            }
        }

        // Nothing earlier is still on disk.
        self.position = shown;
        self.next()
    }

    /// Rebuild the playlist on the next call to `next`.
    pub fn force_reload(&mut self) {
        self.reload = true;
    }

    /// Number of images (not slots) in the playlist.
    pub fn count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    /// The slot most recently returned, if it held images.
    pub fn current(&self) -> Option<&Slide> {
        self.current.as_ref().map(|(_, slide)| slide)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    fn fetch(&self, file_id: i64) -> Option<ImageRecord> {
        match self.db.get(file_id) {
            Ok(Some(record)) if record.path.is_file() => Some(record),
            Ok(Some(record)) => {
                debug!(path = %record.path.display(), "file gone since last scan");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(file_id, error = %e, "cannot read record");
                None
            }
        }
    }

    /// Resolve a group to records whose files exist. A pair missing its
    /// first image shows the second alone.
    fn materialize(&self, group: Group) -> Option<Slide> {
        let primary = group.primary().and_then(|id| self.fetch(id));
        let secondary = group.secondary().and_then(|id| self.fetch(id));
        match (primary, secondary) {
            (Some(primary), secondary) => Some(Slide::Images { primary, secondary }),
            (None, Some(secondary)) => Some(Slide::Images {
                primary: secondary,
                secondary: None,
            }),
            (None, None) => None,
        }
    }

    /// Move the current slot's first image into the deleted-pictures
    /// directory and drop its slot. Returns the new location.
    pub fn delete_current(&mut self) -> io::Result<Option<PathBuf>> {
        let (index, slide) = match self.current.take() {
            Some(current) => current,
            None => return Ok(None),
        };
        let source = match slide.primary() {
            Some(record) => record.path.clone(),
            None => return Ok(None),
        };

        std::fs::create_dir_all(&self.deleted_pictures)?;
        let file_name = source
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let target = self.deleted_pictures.join(file_name);
        move_file(&source, &target)?;
        info!(from = %source.display(), to = %target.display(), "moved to deleted pictures");

        if index < self.groups.len() {
            self.groups.remove(index);
            if index < self.position {
                self.position -= 1;
            }
        }
        Ok(Some(target))
    }

    /// The active directory name and the names that can be passed to
    /// [`PlaylistCursor::set_subdirectory`], root first.
    pub fn directory_list(&self) -> (String, Vec<String>) {
        let root = self.engine.root();
        let root_name = dir_name(root);

        let mut subdirs: Vec<String> = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        subdirs.sort();
        subdirs.insert(0, root_name.clone());

        let active = if self.policy.subdirectory().is_empty() {
            root_name
        } else {
            self.policy.subdirectory().to_string()
        };
        (active, subdirs)
    }

    // Policy mutations: each takes effect at the next `next`.

    pub fn set_filter(&mut self, key: &str, predicate: Option<Predicate>) {
        self.policy.set_filter(key, predicate);
        self.reload = true;
    }

    pub fn set_text_filter(
        &mut self,
        key: &str,
        column: Column,
        text: &str,
    ) -> Result<(), FilterSyntaxError> {
        self.reload = true;
        self.policy.set_text_filter(key, column, text)
    }

    pub fn set_location_filter(&mut self, text: &str) -> Result<(), FilterSyntaxError> {
        self.reload = true;
        self.policy.set_location_filter(text)
    }

    pub fn set_tags_filter(&mut self, text: &str) -> Result<(), FilterSyntaxError> {
        self.reload = true;
        self.policy.set_tags_filter(text)
    }

    pub fn set_taken_after(&mut self, timestamp: Option<f64>) {
        self.policy.set_taken_after(timestamp);
        self.reload = true;
    }

    pub fn set_taken_before(&mut self, timestamp: Option<f64>) {
        self.policy.set_taken_before(timestamp);
        self.reload = true;
    }

    pub fn set_sort(&mut self, spec: &str) {
        self.policy.set_sort(spec);
        self.reload = true;
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.policy.set_shuffle(shuffle);
        self.reload = true;
    }

    pub fn set_recent_days(&mut self, days: u32) {
        self.policy.set_recent_days(days);
        self.reload = true;
    }

    pub fn set_portrait_pairs(&mut self, enabled: bool) {
        self.policy.set_portrait_pairs(enabled);
        self.reload = true;
    }

    pub fn set_calendar_mode(&mut self, mode: CalendarMode) {
        self.policy.set_calendar_mode(mode);
        self.reload = true;
    }

    /// Naming the picture root itself selects the whole tree.
    pub fn set_subdirectory(&mut self, name: &str) {
        let name = name.trim_matches('/');
        if name == dir_name(self.engine.root()) {
            self.policy.set_subdirectory("");
        } else {
            self.policy.set_subdirectory(name);
        }
        self.reload = true;
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(source, target)?;
            std::fs::remove_file(source)
        }
    }
}
