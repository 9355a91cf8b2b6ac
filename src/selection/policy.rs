use std::collections::BTreeMap;
use tracing::warn;

use crate::config::PlaylistConfig;
use crate::db::{Column, Predicate, SortKey};
use crate::error::FilterSyntaxError;

use super::filter::parse_filter;

/// Filter keys used by the built-in setters.
pub const LOCATION_FILTER: &str = "location";
pub const TAGS_FILTER: &str = "tags";
pub const TAKEN_AFTER_FILTER: &str = "taken_after";
pub const TAKEN_BEFORE_FILTER: &str = "taken_before";

/// Date-based override of the user's filters and sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarMode {
    /// Same month during the first week of the month (when configured),
    /// otherwise off.
    #[default]
    Auto,
    Off,
    SameMonth,
    SameDay,
}

/// Everything that decides which images play and in what order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    where_clauses: BTreeMap<String, Predicate>,
    sort: Vec<SortKey>,
    shuffle: bool,
    recent_days: u32,
    subdirectory: String,
    calendar: CalendarMode,
    portrait_pairs: bool,
    first_week_same_month: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::from_config(&PlaylistConfig::default())
    }
}

impl SelectionPolicy {
    pub fn from_config(config: &PlaylistConfig) -> Self {
        Self {
            where_clauses: BTreeMap::new(),
            sort: parse_sort_spec(&config.sort_cols),
            shuffle: config.shuffle,
            recent_days: config.recent_n,
            subdirectory: config.subdirectory.trim_matches('/').to_string(),
            calendar: CalendarMode::Auto,
            portrait_pairs: config.portrait_pairs,
            first_week_same_month: config.first_week_same_month,
        }
    }

    /// Install or replace the predicate under `key`; `None` removes it.
    pub fn set_filter(&mut self, key: &str, predicate: Option<Predicate>) {
        match predicate {
            Some(predicate) => {
                self.where_clauses.insert(key.to_string(), predicate);
            }
            None => {
                self.where_clauses.remove(key);
            }
        }
    }

    /// Parse `text` as a filter on `column` under `key`. Blank text clears
    /// the key. Unparseable text also clears it, so the playlist widens
    /// rather than breaks; the error is returned for reporting only.
    pub fn set_text_filter(
        &mut self,
        key: &str,
        column: Column,
        text: &str,
    ) -> Result<(), FilterSyntaxError> {
        match parse_filter(column, text) {
            Ok(predicate) => {
                self.set_filter(key, predicate);
                Ok(())
            }
            Err(e) => {
                warn!(key, text, error = %e, "ignoring malformed filter");
                self.set_filter(key, None);
                Err(e)
            }
        }
    }

    pub fn set_location_filter(&mut self, text: &str) -> Result<(), FilterSyntaxError> {
        self.set_text_filter(LOCATION_FILTER, Column::Location, text)
    }

    pub fn set_tags_filter(&mut self, text: &str) -> Result<(), FilterSyntaxError> {
        self.set_text_filter(TAGS_FILTER, Column::Tags, text)
    }

    /// Only images taken after `timestamp` (unix seconds); `None` clears.
    pub fn set_taken_after(&mut self, timestamp: Option<f64>) {
        self.set_filter(TAKEN_AFTER_FILTER, timestamp.map(Predicate::taken_after));
    }

    pub fn set_taken_before(&mut self, timestamp: Option<f64>) {
        self.set_filter(TAKEN_BEFORE_FILTER, timestamp.map(Predicate::taken_before));
    }

    pub fn filter(&self, key: &str) -> Option<&Predicate> {
        self.where_clauses.get(key)
    }

    pub fn filters(&self) -> impl Iterator<Item = &Predicate> {
        self.where_clauses.values()
    }

    pub fn set_sort(&mut self, spec: &str) {
        self.sort = parse_sort_spec(spec);
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn set_recent_days(&mut self, days: u32) {
        self.recent_days = days;
    }

    pub fn recent_days(&self) -> u32 {
        self.recent_days
    }

    /// Directory below the picture root, `""` for the whole tree.
    pub fn set_subdirectory(&mut self, name: &str) {
        self.subdirectory = name.trim_matches('/').to_string();
    }

    pub fn subdirectory(&self) -> &str {
        &self.subdirectory
    }

    pub fn set_calendar_mode(&mut self, mode: CalendarMode) {
        self.calendar = mode;
    }

    pub fn calendar_mode(&self) -> CalendarMode {
        self.calendar
    }

    pub fn set_portrait_pairs(&mut self, enabled: bool) {
        self.portrait_pairs = enabled;
    }

    pub fn portrait_pairs(&self) -> bool {
        self.portrait_pairs
    }

    pub fn first_week_same_month(&self) -> bool {
        self.first_week_same_month
    }
}

/// Parse `"col [ASC|DESC], ..."`. Malformed entries are dropped; whether a
/// column exists is decided later against the store.
pub fn parse_sort_spec(spec: &str) -> Vec<SortKey> {
    spec.split(',')
        .filter_map(|item| {
            let words: Vec<&str> = item.split_whitespace().collect();
            let (column, descending) = match words.as_slice() {
                [column] => (*column, false),
                [column, dir] if dir.eq_ignore_ascii_case("asc") => (*column, false),
                [column, dir] if dir.eq_ignore_ascii_case("desc") => (*column, true),
                _ => return None,
            };
            if column.is_empty() || !column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return None;
            }
            Some(SortKey {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_clear_restores_previous_filters() {
        let mut policy = SelectionPolicy::default();
        policy.set_filter("make", Some(Predicate::like(Column::Make, "canon")));
        let before = policy.clone();

        policy.set_filter("lens", Some(Predicate::like(Column::Lens, "50mm")));
        policy.set_filter("lens", Some(Predicate::like(Column::Lens, "35mm")));
        assert_eq!(policy.filters().count(), 2);

        policy.set_filter("lens", None);
        assert_eq!(policy, before);
    }

    #[test]
    fn test_malformed_text_filter_clears_key() {
        let mut policy = SelectionPolicy::default();
        policy.set_location_filter("paris").unwrap();
        assert!(policy.filter(LOCATION_FILTER).is_some());

        assert!(policy.set_location_filter("((").is_err());
        assert!(policy.filter(LOCATION_FILTER).is_none());

        policy.set_location_filter("paris").unwrap();
        let nested = format!("{}a{}", "(".repeat(20_000), ")".repeat(20_000));
        assert!(policy.set_location_filter(&nested).is_err());
        assert!(policy.filter(LOCATION_FILTER).is_none());

        policy.set_tags_filter("beach").unwrap();
        policy.set_tags_filter("  ").unwrap();
        assert_eq!(policy.filters().count(), 0);
    }

    #[test]
    fn test_date_filters() {
        let mut policy = SelectionPolicy::default();
        policy.set_taken_after(Some(100.0));
        policy.set_taken_before(Some(200.0));
        assert_eq!(policy.filter(TAKEN_AFTER_FILTER), Some(&Predicate::taken_after(100.0)));
        policy.set_taken_after(None);
        assert_eq!(policy.filters().count(), 1);
    }

    #[test]
    fn test_parse_sort_spec() {
        assert_eq!(
            parse_sort_spec("exif_datetime DESC, path"),
            vec![SortKey::desc("exif_datetime"), SortKey::asc("path")]
        );
        assert_eq!(
            parse_sort_spec("rating sideways, ; DROP, make asc, , x y z"),
            vec![SortKey::asc("make")]
        );
        assert!(parse_sort_spec("").is_empty());
    }

    #[test]
    fn test_subdirectory_normalized() {
        let mut policy = SelectionPolicy::default();
        policy.set_subdirectory("/holidays/2023/");
        assert_eq!(policy.subdirectory(), "holidays/2023");
    }
}
