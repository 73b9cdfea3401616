//! In-memory search backend

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{total_pages, GeoPoint, NodeQuery, SearchBackend, SearchDocument, SearchResults};
use crate::error::SearchError;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Search backend over process-local maps, one per index
#[derive(Default)]
pub struct InMemorySearch {
    indices: RwLock<HashMap<String, BTreeMap<String, SearchDocument>>>,
    unavailable: AtomicBool,
}

impl InMemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored document, if any
    pub async fn document(&self, index: &str, id: &str) -> Option<SearchDocument> {
        self.indices
            .read()
            .await
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub async fn count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), SearchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::Backend("search backend unavailable".to_string()));
        }
        Ok(())
    }
}

fn matches(doc: &SearchDocument, query: &NodeQuery, country: Option<&str>) -> bool {
    if let Some(schema) = &query.schema {
        if !doc.linked_schemas.iter().any(|s| s == schema) {
            return false;
        }
    }
    if let Some(country) = country {
        let doc_country = doc.maplocation.country.as_deref().map(str::to_uppercase);
        if doc_country.as_deref() != Some(country) {
            return false;
        }
    }
    if query.region.is_some() && doc.maplocation.region != query.region {
        return false;
    }
    if query.locality.is_some() && doc.maplocation.locality != query.locality {
        return false;
    }
    if let Some(since) = query.last_updated {
        if doc.last_checked < since {
            return false;
        }
    }
    true
}

#[async_trait]
impl SearchBackend for InMemorySearch {
    async fn index_with_id(
        &self,
        index: &str,
        id: &str,
        doc: &SearchDocument,
    ) -> Result<(), SearchError> {
        self.check_available()?;
        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn search(&self, index: &str, query: &NodeQuery) -> Result<SearchResults, SearchError> {
        self.check_available()?;
        let geo = query.geo_filter()?;
        let country = query.country();

        let indices = self.indices.read().await;
        let hits: Vec<&SearchDocument> = indices
            .get(index)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches(doc, query, country.as_deref()))
                    .filter(|doc| match (&geo, doc.geolocation) {
                        (None, _) => true,
                        (Some(filter), Some(point)) => {
                            haversine_m(filter.center, point) <= filter.meters
                        }
                        (Some(_), None) => false,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = hits.len() as u64;
        let page_size = query.page_size();
        let page = hits
            .into_iter()
            .skip(query.from() as usize)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok(SearchResults {
            hits: page,
            total,
            total_pages: total_pages(total, page_size),
        })
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<(), SearchError> {
        self.check_available()?;
        if let Some(docs) = self.indices.write().await.get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MapLocation;

    fn doc(url: &str, country: &str, point: Option<GeoPoint>, checked: i64) -> SearchDocument {
        SearchDocument {
            geolocation: point,
            last_checked: checked,
            linked_schemas: vec!["organizations_schema-v1.0.0".into()],
            maplocation: MapLocation {
                country: Some(country.into()),
                locality: Some("Berlin".into()),
                region: None,
            },
            profile_url: url.into(),
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        let paris = GeoPoint { lat: 48.8566, lon: 2.3522 };
        let london = GeoPoint { lat: 51.5074, lon: -0.1278 };
        let d = haversine_m(paris, london);
        assert!((d - 343_500.0).abs() < 2_000.0, "got {d}");
    }

    #[tokio::test]
    async fn test_filters_are_conjunctive() {
        let search = InMemorySearch::new();
        let berlin = GeoPoint { lat: 52.52, lon: 13.405 };
        search
            .index_with_id("nodes", "a", &doc("https://a.example", "DE", Some(berlin), 100))
            .await
            .unwrap();
        search
            .index_with_id("nodes", "b", &doc("https://b.example", "FR", None, 200))
            .await
            .unwrap();

        let by_country = NodeQuery {
            country: Some("de".into()),
            ..Default::default()
        };
        let results = search.search("nodes", &by_country).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].profile_url, "https://a.example");

        let recent = NodeQuery {
            last_updated: Some(150),
            ..Default::default()
        };
        let results = search.search("nodes", &recent).await.unwrap();
        assert_eq!(results.hits[0].profile_url, "https://b.example");

        let nearby = NodeQuery {
            lat: Some(52.5),
            lon: Some(13.4),
            range: Some("10km".into()),
            ..Default::default()
        };
        let results = search.search("nodes", &nearby).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.total_pages, 1);
    }

    #[tokio::test]
    async fn test_pagination() {
        let search = InMemorySearch::new();
        for i in 0..5 {
            search
                .index_with_id("nodes", &format!("id{i}"), &doc(&format!("u{i}"), "DE", None, i))
                .await
                .unwrap();
        }
        let query = NodeQuery {
            page: Some(3),
            page_size: Some(2),
            ..Default::default()
        };
        let results = search.search("nodes", &query).await.unwrap();
        assert_eq!(results.total, 5);
        assert_eq!(results.total_pages, 3);
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].profile_url, "u4");
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let search = InMemorySearch::new();
        search.delete_by_id("nodes", "missing").await.unwrap();
        search.set_unavailable(true);
        assert!(search.delete_by_id("nodes", "missing").await.is_err());
    }
}
