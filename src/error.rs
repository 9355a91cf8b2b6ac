//! Error taxonomy for the cache and the selection engine.
//!
//! None of these are fatal to the host process: extraction failures skip a
//! file for one pass, storage failures degrade to an empty playlist, filter
//! syntax errors drop the offending filter.

use std::path::PathBuf;
use thiserror::Error;

/// The metadata store could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for a single file could not be extracted.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode image header of {path}: {message}")]
    Undecodable { path: PathBuf, message: String },
}

/// A textual filter predicate could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSyntaxError {
    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("disallowed character {0:?}")]
    DisallowedCharacter(char),

    #[error("operator {0} is missing an operand")]
    DanglingOperator(String),

    #[error("empty group")]
    EmptyGroup,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("filter nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A reverse-geocoding lookup failed. Not memoized; retried on a later pass.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geocoder request failed: {0}")]
    Transport(String),

    #[error("geocoder response malformed: {0}")]
    Decode(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
