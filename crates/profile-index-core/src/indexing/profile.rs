//! Profile normalization ahead of indexing
//!
//! Steps run in a fixed order and do not share a failure policy: a malformed
//! geolocation string aborts the pass, a bad `primary_url` is blanked, and an
//! unknown country passes through untouched.

use serde_json::{json, Map, Number, Value};

use super::country::country_code;
use crate::error::NormalizeError;
use crate::search::{GeoPoint, MapLocation, SearchDocument};

/// Limits applied to the `tags` array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagLimits {
    pub max_count: usize,
    pub max_len: usize,
}

/// A validated profile document being prepared for the search projection
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    json: Map<String, Value>,
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn string_field<'a>(json: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Value::as_str)
}

impl Profile {
    /// Parse a compacted profile string
    pub fn parse(profile_str: &str) -> Result<Self, NormalizeError> {
        let value: Value = serde_json::from_str(profile_str)
            .map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Object(json) => Ok(Self { json }),
            _ => Err(NormalizeError::NotAnObject),
        }
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.json
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.json)
    }

    /// Run every normalization step in order
    pub fn normalize(&mut self, limits: TagLimits) -> Result<(), NormalizeError> {
        self.convert_geolocation()?;
        self.repackage_geolocation();
        self.normalize_country_code();
        self.filter_tags(limits);
        self.normalize_primary_url();
        self.set_default_status();
        Ok(())
    }

    /// `"<lat>,<lon>"` strings become numeric `latitude`/`longitude`
    ///
    /// An object `{lat, lon}` fills `latitude`/`longitude` when they are absent.
    pub fn convert_geolocation(&mut self) -> Result<(), NormalizeError> {
        let (lat, lon) = match self.json.get("geolocation") {
            Some(Value::String(raw)) => parse_lat_lon(raw)?,
            Some(Value::Object(point)) => {
                match (
                    point.get("lat").and_then(Value::as_f64),
                    point.get("lon").and_then(Value::as_f64),
                ) {
                    (Some(lat), Some(lon)) => (lat, lon),
                    _ => return Ok(()),
                }
            }
            _ => return Ok(()),
        };
        if !self.json.contains_key("latitude") {
            self.json.insert("latitude".to_string(), number(lat));
        }
        if !self.json.contains_key("longitude") {
            self.json.insert("longitude".to_string(), number(lon));
        }
        Ok(())
    }

    /// Build `geolocation: {lat, lon}` from `latitude`/`longitude`
    ///
    /// A missing side defaults to 0; nothing is built when both are missing.
    pub fn repackage_geolocation(&mut self) {
        let lat = self.json.get("latitude").and_then(Value::as_f64);
        let lon = self.json.get("longitude").and_then(Value::as_f64);
        if lat.is_none() && lon.is_none() {
            return;
        }
        self.json.insert(
            "geolocation".to_string(),
            json!({
                "lat": lat.unwrap_or(0.0),
                "lon": lon.unwrap_or(0.0),
            }),
        );
    }

    /// Set `country` to an alpha-2 code from `country_iso_3166`, `country_name` or `country`
    pub fn normalize_country_code(&mut self) {
        let source = ["country_iso_3166", "country_name", "country"]
            .iter()
            .find_map(|key| string_field(&self.json, key))
            .map(str::to_string);
        if let Some(source) = source {
            let country = country_code(&source).map(str::to_string).unwrap_or(source);
            self.json
                .insert("country".to_string(), Value::String(country));
        }
    }

    /// Keep the first `max_count` tags, each cut to `max_len` characters
    pub fn filter_tags(&mut self, limits: TagLimits) {
        let Some(Value::Array(tags)) = self.json.get_mut("tags") else {
            return;
        };
        tags.truncate(limits.max_count);
        for tag in tags.iter_mut() {
            if let Value::String(s) = tag {
                if s.chars().count() > limits.max_len {
                    *s = s.chars().take(limits.max_len).collect();
                }
            }
        }
    }

    /// Strip scheme and leading `www.` from `primary_url`; blank it when unusable
    pub fn normalize_primary_url(&mut self) {
        let Some(current) = self.json.get("primary_url") else {
            return;
        };
        let normalized = match current {
            Value::String(raw) => normalize_url(raw).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "primary_url blanked");
                String::new()
            }),
            _ => String::new(),
        };
        self.json
            .insert("primary_url".to_string(), Value::String(normalized));
    }

    /// Content-level `status` defaults to `posted`
    pub fn set_default_status(&mut self) {
        self.json
            .entry("status")
            .or_insert_with(|| Value::String("posted".to_string()));
    }

    /// The fixed search projection of this profile
    pub fn search_document(&self, profile_url: &str, last_checked: i64) -> SearchDocument {
        let geolocation = self
            .json
            .get("geolocation")
            .and_then(Value::as_object)
            .and_then(|point| {
                Some(GeoPoint {
                    lat: point.get("lat")?.as_f64()?,
                    lon: point.get("lon")?.as_f64()?,
                })
            });

        let linked_schemas = self
            .json
            .get("linked_schemas")
            .and_then(Value::as_array)
            .map(|schemas| {
                schemas
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let keyword = |key: &str| string_field(&self.json, key).map(str::to_string);

        SearchDocument {
            geolocation,
            last_checked,
            linked_schemas,
            maplocation: MapLocation {
                country: keyword("country"),
                locality: keyword("locality"),
                region: keyword("region"),
            },
            profile_url: profile_url.to_string(),
        }
    }
}

fn parse_lat_lon(raw: &str) -> Result<(f64, f64), NormalizeError> {
    let invalid = || NormalizeError::Geolocation(raw.to_string());
    let (lat, lon) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    if !lat.is_finite() || !lon.is_finite() {
        return Err(invalid());
    }
    Ok((lat, lon))
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// `https://www.example.com/path/` → `example.com/path`
pub fn normalize_url(raw: &str) -> Result<String, NormalizeError> {
    let invalid = || NormalizeError::Url(raw.to_string());
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let rest = match trimmed.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        Some(_) => return Err(invalid()),
        None => trimmed,
    };
    let rest = rest.split_once("://").map_or(rest, |(head, _)| head);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.trim_end_matches('/');

    if rest.is_empty() {
        return Err(invalid());
    }
    Ok(rest.to_string())
}
