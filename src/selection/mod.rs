//! Turning a selection policy into an ordered list of display slots.

pub mod engine;
pub mod filter;
pub mod policy;

pub use engine::{pair_portraits, Group, Query, SelectionEngine, Selector};
pub use filter::parse_filter;
pub use policy::{parse_sort_spec, CalendarMode, SelectionPolicy};
