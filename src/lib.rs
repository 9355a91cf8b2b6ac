//! Background-maintained image metadata cache and playlist engine for a
//! digital photo frame.
//!
//! A scanner thread keeps a SQLite store in line with the picture
//! directory; the display loop draws slides from a [`playlist::PlaylistCursor`]
//! that queries the store whenever its selection policy changes.

pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod playlist;
pub mod scanner;
pub mod selection;
pub mod slideshow;

pub use config::Config;
pub use db::Database;
pub use playlist::{PlaylistCursor, Slide};
pub use slideshow::Slideshow;
