use std::io;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directories whose name starts with `.` are never entered.
fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        }
        None => false,
    }
}

/// Walk `root` and return every image file below it, sorted by path.
///
/// A missing root is an error rather than an empty list, so an unmounted
/// share never looks like a tree whose pictures were all deleted.
pub fn discover_images(
    root: &Path,
    extensions: &[String],
    follow_links: bool,
) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("picture directory {} is not available", root.display()),
        ));
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && has_image_extension(entry.path(), extensions) {
            images.push(entry.into_path());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_discover_images() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("document.txt")).unwrap();

        fs::create_dir(dir.path().join("subdir")).unwrap();
        File::create(dir.path().join("subdir/photo3.jpeg")).unwrap();

        let images = discover_images(dir.path(), &extensions(), false).unwrap();

        assert_eq!(
            images,
            vec![
                dir.path().join("photo1.jpg"),
                dir.path().join("photo2.PNG"),
                dir.path().join("subdir/photo3.jpeg"),
            ]
        );
    }

    #[test]
    fn test_hidden_directories_skipped() {
        let dir = tempdir().unwrap();

        fs::create_dir(dir.path().join(".thumbnails")).unwrap();
        File::create(dir.path().join(".thumbnails/cached.jpg")).unwrap();
        File::create(dir.path().join("visible.jpg")).unwrap();

        let images = discover_images(dir.path(), &extensions(), false).unwrap();
        assert_eq!(images, vec![dir.path().join("visible.jpg")]);
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let dir = tempdir().unwrap();
        let root = dir.path().join(".frame");
        fs::create_dir(&root).unwrap();
        File::create(root.join("a.jpg")).unwrap();

        let images = discover_images(&root, &extensions(), false).unwrap();
        assert_eq!(images.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_followed_only_when_enabled() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pictures");
        let elsewhere = dir.path().join("holiday");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&elsewhere).unwrap();
        File::create(root.join("a.jpg")).unwrap();
        File::create(elsewhere.join("b.jpg")).unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("linked")).unwrap();

        let images = discover_images(&root, &extensions(), false).unwrap();
        assert_eq!(images, vec![root.join("a.jpg")]);

        let images = discover_images(&root, &extensions(), true).unwrap();
        assert_eq!(images, vec![root.join("a.jpg"), root.join("linked/b.jpg")]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempdir().unwrap();
        let err = discover_images(&dir.path().join("gone"), &extensions(), false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
