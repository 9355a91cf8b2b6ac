//! Change detection for files under the picture directory.
//!
//! A file's fingerprint is its modification time; any difference from the
//! stored value (newer or older) marks it for re-extraction.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// No record exists for the path.
    New,
    /// A record exists with a different fingerprint.
    Modified,
    Unchanged,
}

/// Modification time in seconds since the epoch, with sub-second precision.
pub fn fingerprint(path: &Path) -> io::Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    };
    Ok(secs)
}

pub fn classify(stored: Option<f64>, current: f64) -> FileChange {
    match stored {
        None => FileChange::New,
        Some(stored) if stored == current => FileChange::Unchanged,
        Some(_) => FileChange::Modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 10.0), FileChange::New);
        assert_eq!(classify(Some(10.0), 10.0), FileChange::Unchanged);
        assert_eq!(classify(Some(10.0), 11.5), FileChange::Modified);
        // Going back in time counts too (restored from backup).
        assert_eq!(classify(Some(10.0), 9.0), FileChange::Modified);
    }

    #[test]
    fn test_fingerprint_follows_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        let file = File::create(&path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(1_600_000_000))
            .unwrap();

        assert_eq!(fingerprint(&path).unwrap(), 1_600_000_000.0);

        file.set_modified(SystemTime::now()).unwrap();
        assert!(fingerprint(&path).unwrap() > 1_600_000_000.0);
    }
}
