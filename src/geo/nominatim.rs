//! Reverse geocoding against a Nominatim-compatible HTTP endpoint.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::GeoResolver;
use crate::config::GeoConfig;
use crate::error::GeoError;

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: HashMap<String, serde_json::Value>,
    display_name: Option<String>,
    error: Option<String>,
}

pub struct NominatimResolver {
    agent: ureq::Agent,
    endpoint: String,
    user_agent: String,
    key_list: Vec<Vec<String>>,
}

impl NominatimResolver {
    pub fn new(config: &GeoConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            endpoint: config.endpoint.clone(),
            user_agent: config.user_agent.clone(),
            key_list: config.key_list.clone(),
        }
    }
}

impl GeoResolver for NominatimResolver {
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeoError> {
        let response: ReverseResponse = self
            .agent
            .get(&self.endpoint)
            .set("User-Agent", &self.user_agent)
            .query("format", "jsonv2")
            .query("lat", &latitude.to_string())
            .query("lon", &longitude.to_string())
            .query("zoom", "18")
            .query("addressdetails", "1")
            .call()
            .map_err(|e| GeoError::Transport(e.to_string()))?
            .into_json()
            .map_err(|e| GeoError::Decode(e.to_string()))?;

        if response.error.is_some() {
            // Open sea and similar: a valid answer with nothing to show.
            return Ok(None);
        }

        Ok(locality_from_address(&response.address, &self.key_list).or(response.display_name))
    }
}

/// Join, in group order, the first address key present in each group.
fn locality_from_address(
    address: &HashMap<String, serde_json::Value>,
    key_list: &[Vec<String>],
) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for group in key_list {
        let found = group
            .iter()
            .find_map(|key| address.get(key).and_then(|v| v.as_str()));
        if let Some(part) = found {
            if !parts.contains(&part) {
                parts.push(part);
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(pairs: &[(&str, &str)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_locality_uses_first_key_of_each_group() {
        let key_list = GeoConfig::default().key_list;
        let addr = address(&[
            ("village", "Giverny"),
            ("county", "Eure"),
            ("state", "Normandy"),
            ("country", "France"),
            ("postcode", "27620"),
        ]);
        assert_eq!(
            locality_from_address(&addr, &key_list).as_deref(),
            Some("Giverny, Eure, Normandy, France")
        );
    }

    #[test]
    fn test_locality_skips_duplicates_and_empty() {
        let key_list = GeoConfig::default().key_list;
        let addr = address(&[("city", "Monaco"), ("country", "Monaco")]);
        assert_eq!(locality_from_address(&addr, &key_list).as_deref(), Some("Monaco"));
        assert_eq!(locality_from_address(&HashMap::new(), &key_list), None);
    }

    #[test]
    fn test_response_decoding() {
        let body = r#"{"display_name": "Somewhere", "address": {"city": "Lyon", "country": "France", "ISO3166-2-lvl4": "FR-ARA"}}"#;
        let response: ReverseResponse = serde_json::from_str(body).unwrap();
        let key_list = GeoConfig::default().key_list;
        assert_eq!(
            locality_from_address(&response.address, &key_list).as_deref(),
            Some("Lyon, France")
        );

        let error: ReverseResponse = serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert!(error.error.is_some());
    }
}
