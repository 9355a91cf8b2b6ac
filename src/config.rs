use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub playlist: PlaylistConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Walk the tree again after every rest interval.
    #[default]
    Continuous,
    /// Walk only when a pass is requested.
    OnDemand,
    /// Never scan here; `framecache-daemon` writes the store from another
    /// process and the frame only reads it.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_pic_dir")]
    pub pic_dir: PathBuf,

    #[serde(default)]
    pub follow_links: bool,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default)]
    pub mode: ScanMode,

    /// Seconds to rest between continuous passes.
    #[serde(default = "default_rest_interval_secs")]
    pub rest_interval_secs: u64,

    /// How often a paused scanner checks whether it may resume.
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,
}

fn default_pic_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("Pictures"))
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "heic".to_string(),
        "heif".to_string(),
    ]
}

fn default_rest_interval_secs() -> u64 {
    60
}

fn default_pause_poll_ms() -> u64 {
    100
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            pic_dir: default_pic_dir(),
            follow_links: false,
            image_extensions: default_image_extensions(),
            mode: ScanMode::default(),
            rest_interval_secs: default_rest_interval_secs(),
            pause_poll_ms: default_pause_poll_ms(),
        }
    }
}

impl ScannerConfig {
    pub fn rest_interval(&self) -> Duration {
        Duration::from_secs(self.rest_interval_secs)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn root(&self) -> PathBuf {
        expand_home(&self.pic_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_geo_enabled")]
    pub enabled: bool,

    /// Decimal places kept when rounding coordinates for the lookup cache.
    #[serde(default = "default_geo_precision")]
    pub precision: u32,

    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,

    /// Identifies this frame to the geocoder (public Nominatim requires a contact).
    #[serde(default = "default_geo_user_agent")]
    pub user_agent: String,

    /// Groups of address keys; the first key present in each group
    /// contributes one part of the locality string.
    #[serde(default = "default_key_list")]
    pub key_list: Vec<Vec<String>>,

    #[serde(default = "default_geo_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_geo_enabled() -> bool {
    true
}

fn default_geo_precision() -> u32 {
    3
}

fn default_geo_endpoint() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_geo_user_agent() -> String {
    format!("framecache/{} (set geo.user_agent to your contact)", env!("CARGO_PKG_VERSION"))
}

fn default_key_list() -> Vec<Vec<String>> {
    [
        &["tourism", "amenity", "isolated_dwelling"][..],
        &["suburb", "village"][..],
        &["city", "county"][..],
        &["region", "state", "province"][..],
        &["country"][..],
    ]
    .iter()
    .map(|group| group.iter().map(|k| k.to_string()).collect())
    .collect()
}

fn default_geo_timeout_secs() -> u64 {
    10
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: default_geo_enabled(),
            precision: default_geo_precision(),
            endpoint: default_geo_endpoint(),
            user_agent: default_geo_user_agent(),
            key_list: default_key_list(),
            timeout_secs: default_geo_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Directory below `pic_dir` to show; empty shows the whole tree.
    #[serde(default)]
    pub subdirectory: String,

    /// Comma separated `column [ASC|DESC]` list.
    #[serde(default = "default_sort_cols")]
    pub sort_cols: String,

    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    /// Images modified within this many days are shown first (0 disables).
    #[serde(default = "default_recent_n")]
    pub recent_n: u32,

    /// Full traversals between reshuffles.
    #[serde(default = "default_reshuffle_num")]
    pub reshuffle_num: u32,

    #[serde(default)]
    pub portrait_pairs: bool,

    /// Image shown when nothing matches.
    #[serde(default = "default_no_files_img")]
    pub no_files_img: PathBuf,

    #[serde(default = "default_deleted_pictures")]
    pub deleted_pictures: PathBuf,

    /// Show the current month's photos during the first week of the month.
    #[serde(default = "default_first_week_same_month")]
    pub first_week_same_month: bool,
}

fn default_sort_cols() -> String {
    "path ASC".to_string()
}

fn default_shuffle() -> bool {
    true
}

fn default_recent_n() -> u32 {
    3
}

fn default_reshuffle_num() -> u32 {
    1
}

fn default_no_files_img() -> PathBuf {
    data_dir().join("no_pictures.jpg")
}

fn default_deleted_pictures() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("DeletedPictures")
}

fn default_first_week_same_month() -> bool {
    true
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            subdirectory: String::new(),
            sort_cols: default_sort_cols(),
            shuffle: default_shuffle(),
            recent_n: default_recent_n(),
            reshuffle_num: default_reshuffle_num(),
            portrait_pairs: false,
            no_files_img: default_no_files_img(),
            deleted_pictures: default_deleted_pictures(),
            first_week_same_month: default_first_week_same_month(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("framecache")
}

fn default_db_path() -> PathBuf {
    data_dir().join("framecache.db3")
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scanner: ScannerConfig::default(),
            geo: GeoConfig::default(),
            playlist: PlaylistConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("framecache")
    }

    pub fn log_dir() -> PathBuf {
        data_dir().join("logs")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FRAMECACHE_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/frame.db3"

            [scanner]
            pic_dir = "/srv/pictures"
            mode = "on_demand"

            [playlist]
            portrait_pairs = true
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/frame.db3"));
        assert_eq!(config.scanner.mode, ScanMode::OnDemand);
        assert_eq!(config.scanner.rest_interval_secs, 60);
        assert!(config.playlist.portrait_pairs);
        assert_eq!(config.playlist.sort_cols, "path ASC");
        assert_eq!(config.geo.key_list.len(), 5);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.playlist.reshuffle_num = 4;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.playlist.reshuffle_num, 4);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/Pictures")), home.join("Pictures"));
        }
    }
}
