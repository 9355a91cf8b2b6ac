/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

pub const SCHEMA: &str = r#"
-- Images table: one row per distinct file path ever seen
CREATE TABLE IF NOT EXISTS images (
    file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    last_modified REAL NOT NULL,

    -- Geometry
    orientation INTEGER NOT NULL DEFAULT 1,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    is_portrait INTEGER NOT NULL DEFAULT 0,

    -- EXIF data
    exif_datetime REAL NOT NULL DEFAULT 0,
    f_number REAL,
    exposure_time TEXT,
    iso INTEGER,
    focal_length REAL,
    make TEXT,
    model TEXT,
    lens TEXT,
    rating INTEGER,

    -- GPS and resolved locality
    latitude REAL,
    longitude REAL,
    location TEXT
);

CREATE INDEX IF NOT EXISTS idx_images_exif_datetime ON images(exif_datetime);
CREATE INDEX IF NOT EXISTS idx_images_last_modified ON images(last_modified);
"#;

/// Additive-only migrations, indexed by the version they bring the store to.
/// Never rename or drop a column: an older binary must keep working against
/// a store written by a newer one and vice versa.
pub const MIGRATIONS: &[(i64, &str)] = &[
    (2, "ALTER TABLE images ADD COLUMN title TEXT"),
    (2, "ALTER TABLE images ADD COLUMN caption TEXT"),
    (2, "ALTER TABLE images ADD COLUMN tags TEXT"),
];
