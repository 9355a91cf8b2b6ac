use chrono::{DateTime, Datelike, Local};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::db::{Candidate, Database, Ordering, Predicate, SortKey};

use super::policy::{CalendarMode, SelectionPolicy};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One display slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Single(i64),
    /// Two portraits shown side by side.
    Pair(i64, i64),
    /// Nothing matched; the display shows a placeholder.
    NoImages,
}

impl Group {
    pub fn primary(&self) -> Option<i64> {
        match self {
            Group::Single(id) | Group::Pair(id, _) => Some(*id),
            Group::NoImages => None,
        }
    }

    pub fn secondary(&self) -> Option<i64> {
        match self {
            Group::Pair(_, id) => Some(*id),
            _ => None,
        }
    }

    /// Number of images in the slot.
    pub fn len(&self) -> usize {
        match self {
            Group::Single(_) => 1,
            Group::Pair(..) => 2,
            Group::NoImages => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which family of query a policy resolves to on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Default,
    SameMonth { month: u32 },
    SameDay { month: u32, day: u32 },
}

/// A concrete query: store predicates and ordering, plus whether the result
/// is shuffled afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub ordering: Ordering,
    pub shuffle: bool,
}

impl Selector {
    pub fn choose(policy: &SelectionPolicy, now: &DateTime<Local>) -> Self {
        let month = now.month();
        let day = now.day();
        match policy.calendar_mode() {
            CalendarMode::SameDay => Selector::SameDay { month, day },
            CalendarMode::SameMonth => Selector::SameMonth { month },
            CalendarMode::Auto if policy.first_week_same_month() && day <= 7 => {
                Selector::SameMonth { month }
            }
            CalendarMode::Auto | CalendarMode::Off => Selector::Default,
        }
    }

    /// Build the query. `scope` is the directory the playlist is limited to.
    pub fn resolve(&self, policy: &SelectionPolicy, scope: &Path, now: f64) -> Query {
        let scope = Predicate::path_under(scope);
        match *self {
            Selector::SameDay { month, day } => Query {
                predicates: vec![scope, Predicate::MonthDay { month, day }],
                ordering: Ordering::Identity,
                shuffle: false,
            },
            Selector::SameMonth { month } => Query {
                predicates: vec![scope, Predicate::Month(month)],
                ordering: Ordering::Identity,
                shuffle: false,
            },
            Selector::Default => {
                let mut predicates = vec![scope];
                predicates.extend(policy.filters().cloned());

                if policy.shuffle() {
                    return Query {
                        predicates,
                        ordering: Ordering::Identity,
                        shuffle: true,
                    };
                }

                let recent_after = (policy.recent_days() > 0)
                    .then(|| now - f64::from(policy.recent_days()) * SECONDS_PER_DAY);
                let mut keys = policy.sort().to_vec();
                if !keys.iter().any(|k| k.column == "path") {
                    keys.push(SortKey::asc("path"));
                }
                Query {
                    predicates,
                    ordering: Ordering::Keys { recent_after, keys },
                    shuffle: false,
                }
            }
        }
    }
}

/// Group an ordered candidate list into display slots. Only adjacent
/// portraits pair up; landscapes always stand alone.
pub fn pair_portraits(candidates: &[Candidate], enabled: bool) -> Vec<Group> {
    let mut groups = Vec::with_capacity(candidates.len());
    let mut i = 0;
    while i < candidates.len() {
        let current = candidates[i];
        match candidates.get(i + 1) {
            Some(next) if enabled && current.is_portrait && next.is_portrait => {
                groups.push(Group::Pair(current.file_id, next.file_id));
                i += 2;
            }
            _ => {
                groups.push(Group::Single(current.file_id));
                i += 1;
            }
        }
    }
    groups
}

/// Turns a policy into a playlist against the store.
pub struct SelectionEngine {
    root: PathBuf,
    rng: StdRng,
}

impl SelectionEngine {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic shuffles, for tests.
    pub fn with_seed(root: PathBuf, seed: u64) -> Self {
        Self {
            root,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the playlist is limited to.
    pub fn scope(&self, policy: &SelectionPolicy) -> PathBuf {
        if policy.subdirectory().is_empty() {
            self.root.clone()
        } else {
            self.root.join(policy.subdirectory())
        }
    }

    /// Run the policy's query. Never empty: no matches, or a store that
    /// cannot be read, yields a single [`Group::NoImages`].
    pub fn select(
        &mut self,
        db: &Database,
        policy: &SelectionPolicy,
        now: &DateTime<Local>,
    ) -> Vec<Group> {
        let selector = Selector::choose(policy, now);
        let query = selector.resolve(policy, &self.scope(policy), now.timestamp() as f64);

        let mut candidates = match db.query(&query.predicates, &query.ordering) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "playlist query failed, treating cache as empty");
                Vec::new()
            }
        };
        if query.shuffle {
            candidates.shuffle(&mut self.rng);
        }

        debug!(?selector, matched = candidates.len(), "playlist selected");

        let groups = pair_portraits(&candidates, policy.portrait_pairs());
        if groups.is_empty() {
            vec![Group::NoImages]
        } else {
            groups
        }
    }
}
