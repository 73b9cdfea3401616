//! Search projection and query model
//!
//! The search backend only ever sees `SearchDocument`: a fixed field set
//! (`geolocation`, `lastChecked`, `linkedSchemas`, `maplocation`,
//! `profileUrl`). Everything else in a profile stays in the primary store.

pub mod memory;

pub use memory::InMemorySearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Default page size for search results
pub const DEFAULT_PAGE_SIZE: u64 = 30;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: u64 = 500;

/// Geo point as indexed by the search backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Keyword location fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLocation {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region: Option<String>,
}

/// Searchable projection of a posted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub geolocation: Option<GeoPoint>,
    /// Epoch seconds of the last successful validation
    pub last_checked: i64,
    #[serde(default)]
    pub linked_schemas: Vec<String>,
    #[serde(default)]
    pub maplocation: MapLocation,
    pub profile_url: String,
}

/// Conjunctive search filters plus pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeQuery {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    /// Only nodes checked at or after this epoch second
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Distance such as `25km`, `10mi` or `500m`
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
}

/// Resolved geo-distance filter
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFilter {
    pub center: GeoPoint,
    /// Distance as given, passed through to backends that parse units
    pub range: String,
    pub meters: f64,
}

impl NodeQuery {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> u64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// 1-based page number
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Offset of the first hit on the requested page
    pub fn from(&self) -> u64 {
        self.page_size().saturating_mul(self.page() - 1)
    }

    /// Country filter, uppercased to match normalized codes
    pub fn country(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
    }

    /// Geo-distance filter; `lat`, `lon` and `range` must come together
    pub fn geo_filter(&self) -> Result<Option<GeoFilter>, SearchError> {
        match (self.lat, self.lon, self.range.as_deref()) {
            (None, None, None) => Ok(None),
            (Some(lat), Some(lon), Some(range)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(SearchError::InvalidQuery(format!(
                        "coordinates out of range: {lat},{lon}"
                    )));
                }
                Ok(Some(GeoFilter {
                    center: GeoPoint { lat, lon },
                    range: range.trim().to_string(),
                    meters: parse_range(range)?,
                }))
            }
            _ => Err(SearchError::InvalidQuery(
                "lat, lon and range must be provided together".to_string(),
            )),
        }
    }

    /// Reject malformed filters before they reach a backend
    pub fn validate(&self) -> Result<(), SearchError> {
        self.geo_filter().map(|_| ())
    }
}

/// Parse a distance like `25km`, `10mi` or `500m` into meters
pub fn parse_range(range: &str) -> Result<f64, SearchError> {
    let range = range.trim().to_ascii_lowercase();
    let (number, factor) = if let Some(n) = range.strip_suffix("km") {
        (n, 1000.0)
    } else if let Some(n) = range.strip_suffix("mi") {
        (n, 1609.344)
    } else if let Some(n) = range.strip_suffix('m') {
        (n, 1.0)
    } else {
        return Err(SearchError::InvalidQuery(format!(
            "range {range:?} must end in km, mi or m"
        )));
    };
    match number.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value * factor),
        _ => Err(SearchError::InvalidQuery(format!(
            "range {range:?} is not a non-negative distance"
        ))),
    }
}

/// Number of pages for `total` hits, never less than one
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    let page_size = page_size.max(1);
    total.div_ceil(page_size).max(1)
}

/// One page of search hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchDocument>,
    pub total: u64,
    pub total_pages: u64,
}

/// Search backend holding node projections
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Insert or replace the document stored under `id`
    async fn index_with_id(
        &self,
        index: &str,
        id: &str,
        doc: &SearchDocument,
    ) -> Result<(), SearchError>;

    async fn search(&self, index: &str, query: &NodeQuery) -> Result<SearchResults, SearchError>;

    /// Remove the document under `id`; absent ids are not an error
    async fn delete_by_id(&self, index: &str, id: &str) -> Result<(), SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        let query = NodeQuery {
            page: Some(3),
            page_size: Some(1000),
            ..Default::default()
        };
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);
        assert_eq!(query.from(), 1000);

        let query = NodeQuery {
            page: Some(0),
            page_size: Some(0),
            ..Default::default()
        };
        assert_eq!(query.page_size(), 1);
        assert_eq!(query.from(), 0);
    }

    #[test]
    fn test_parse_range_units() {
        assert_eq!(parse_range("25km").unwrap(), 25_000.0);
        assert_eq!(parse_range("500m").unwrap(), 500.0);
        assert!((parse_range("10mi").unwrap() - 16_093.44).abs() < 1e-6);
        assert!(parse_range("10 parsecs").is_err());
        assert!(parse_range("-1km").is_err());
    }

    #[test]
    fn test_geo_filter_requires_all_parts() {
        let partial = NodeQuery {
            lat: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            partial.geo_filter(),
            Err(SearchError::InvalidQuery(_))
        ));

        let full = NodeQuery {
            lat: Some(40.0),
            lon: Some(-73.0),
            range: Some("5km".into()),
            ..Default::default()
        };
        let filter = full.geo_filter().unwrap().unwrap();
        assert_eq!(filter.meters, 5000.0);
    }

    #[test]
    fn test_total_pages_at_least_one() {
        assert_eq!(total_pages(0, 30), 1);
        assert_eq!(total_pages(30, 30), 1);
        assert_eq!(total_pages(31, 30), 2);
    }

    #[test]
    fn test_document_wire_names() {
        let doc = SearchDocument {
            geolocation: Some(GeoPoint { lat: 1.0, lon: 2.0 }),
            last_checked: 10,
            linked_schemas: vec!["organizations_schema-v1.0.0".into()],
            maplocation: MapLocation {
                country: Some("US".into()),
                ..Default::default()
            },
            profile_url: "https://a.example/p.json".into(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["lastChecked"], 10);
        assert_eq!(json["profileUrl"], "https://a.example/p.json");
        assert_eq!(json["linkedSchemas"][0], "organizations_schema-v1.0.0");
        assert_eq!(json["maplocation"]["country"], "US");
        assert!(json["maplocation"].get("region").is_none());
    }
}
