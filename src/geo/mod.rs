//! Reverse geocoding with a memoizing cache keyed on rounded coordinates.
//!
//! Lookups may hit the network, so only the scanner calls into this module;
//! the playlist reads the resolved `location` column.

pub mod nominatim;

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::GeoError;

pub use nominatim::NominatimResolver;

/// Maps a coordinate pair to a human-readable locality.
pub trait GeoResolver: Send {
    /// `Ok(None)` means the place has no locality; `Err` means try again later.
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeoError>;
}

impl<R: GeoResolver + ?Sized> GeoResolver for Box<R> {
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeoError> {
        (**self).resolve(latitude, longitude)
    }
}

/// Memoizes resolver answers for the lifetime of the process. Entries are
/// never evicted: a photo collection only has so many distinct places.
pub struct GeoCache<R> {
    resolver: R,
    scale: f64,
    entries: HashMap<(i64, i64), Option<String>>,
}

impl<R: GeoResolver> GeoCache<R> {
    pub fn new(resolver: R, precision: u32) -> Self {
        Self {
            resolver,
            scale: 10f64.powi(precision.min(9) as i32),
            entries: HashMap::new(),
        }
    }

    fn key(&self, latitude: f64, longitude: f64) -> (i64, i64) {
        (
            (latitude * self.scale).round() as i64,
            (longitude * self.scale).round() as i64,
        )
    }

    /// Resolve through the cache. Failures are logged and not remembered.
    pub fn resolve(&mut self, latitude: f64, longitude: f64) -> Option<String> {
        let key = self.key(latitude, longitude);
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }

        match self.resolver.resolve(latitude, longitude) {
            Ok(locality) => {
                debug!(latitude, longitude, ?locality, "geo lookup");
                self.entries.insert(key, locality.clone());
                locality
            }
            Err(e) => {
                warn!(latitude, longitude, error = %e, "geo lookup failed");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
