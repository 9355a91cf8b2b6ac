mod schema;
pub mod predicate;
pub mod sqlite;

use std::path::PathBuf;

pub use predicate::{Column, CompareOp, Predicate};
pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteDb as Database;

/// Whether an EXIF orientation value (1-8) rotates the image by 90 or 270 degrees.
pub fn orientation_swaps_axes(orientation: u16) -> bool {
    matches!(orientation, 5..=8)
}

/// Metadata extracted from an image file, everything a record holds apart
/// from its key and fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    pub orientation: u16,
    pub width: u32,
    pub height: u32,

    /// Date taken (unix seconds); the file mtime is stored when absent.
    pub exif_datetime: Option<f64>,

    // Exposure settings
    pub f_number: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i64>,
    pub focal_length: Option<f64>,

    // Camera info
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub rating: Option<i64>,

    // GPS
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,

    // Descriptive
    pub title: Option<String>,
    pub caption: Option<String>,
    pub tags: Option<String>,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self {
            orientation: 1,
            width: 0,
            height: 0,
            exif_datetime: None,
            f_number: None,
            exposure_time: None,
            iso: None,
            focal_length: None,
            make: None,
            model: None,
            lens: None,
            rating: None,
            latitude: None,
            longitude: None,
            location: None,
            title: None,
            caption: None,
            tags: None,
        }
    }
}

impl ImageMetadata {
    /// Height exceeds width once the EXIF orientation has been applied.
    pub fn is_portrait(&self) -> bool {
        let (width, height) = if orientation_swaps_axes(self.orientation) {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        height > width
    }
}

/// A stored image row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub file_id: i64,
    pub path: PathBuf,
    pub last_modified: f64,
    pub is_portrait: bool,
    pub exif_datetime: f64,
    pub meta: ImageMetadata,
}

/// Minimal row returned by playlist queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub file_id: i64,
    pub is_portrait: bool,
}

/// One sort key; `column` must name an existing column to take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Result ordering requested from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Ordering {
    /// Insertion order (`file_id` ascending).
    Identity,
    /// Records modified after `recent_after` first (when set), then `keys`.
    Keys {
        recent_after: Option<f64>,
        keys: Vec<SortKey>,
    },
}

/// What `upsert` did with a scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    Unchanged(i64),
}

impl UpsertOutcome {
    pub fn file_id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) | UpsertOutcome::Unchanged(id) => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portrait_uses_corrected_axes() {
        let mut meta = ImageMetadata {
            width: 400,
            height: 300,
            ..Default::default()
        };
        assert!(!meta.is_portrait());

        // Rotated 90 CW: the stored landscape frame displays as portrait.
        meta.orientation = 6;
        assert!(meta.is_portrait());

        meta.orientation = 3;
        assert!(!meta.is_portrait());
    }

    #[test]
    fn test_square_is_not_portrait() {
        let meta = ImageMetadata {
            width: 100,
            height: 100,
            ..Default::default()
        };
        assert!(!meta.is_portrait());
    }
}
