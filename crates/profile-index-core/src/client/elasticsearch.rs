//! Elasticsearch search backend
//!
//! Talks to the REST API directly. Connecting pings the cluster with
//! exponential backoff and creates the node index with a fixed, non-dynamic
//! mapping when it does not exist yet, so only projection fields are ever
//! indexed or returned.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::SearchError;
use crate::search::{total_pages, NodeQuery, SearchBackend, SearchDocument, SearchResults};

/// Configuration for the Elasticsearch client
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Cluster base URL
    pub url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// First delay between connection attempts
    pub initial_backoff: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Longest delay between connection attempts
    pub max_backoff: Duration,

    /// Give up connecting after this long
    pub max_elapsed: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl SearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }
}

/// Mapping for the node index
pub fn node_index_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic": "false",
            "_source": {
                "includes": ["geolocation", "lastChecked", "linkedSchemas", "maplocation", "profileUrl"]
            },
            "properties": {
                "geolocation": {"type": "geo_point"},
                "lastChecked": {"type": "date", "format": "epoch_second"},
                "linkedSchemas": {"type": "keyword"},
                "maplocation": {
                    "properties": {
                        "country": {"type": "keyword"},
                        "locality": {"type": "keyword"},
                        "region": {"type": "keyword"}
                    }
                },
                "profileUrl": {"type": "keyword"}
            }
        }
    })
}

/// `_search` request body for a query; filters are conjunctive and unscored
pub fn build_search_body(query: &NodeQuery) -> Result<Value, SearchError> {
    let mut filters = Vec::new();
    if let Some(schema) = &query.schema {
        filters.push(json!({"term": {"linkedSchemas": schema}}));
    }
    if let Some(country) = query.country() {
        filters.push(json!({"term": {"maplocation.country": country}}));
    }
    if let Some(region) = &query.region {
        filters.push(json!({"term": {"maplocation.region": region}}));
    }
    if let Some(locality) = &query.locality {
        filters.push(json!({"term": {"maplocation.locality": locality}}));
    }
    if let Some(since) = query.last_updated {
        filters.push(json!({"range": {"lastChecked": {"gte": since}}}));
    }
    if let Some(geo) = query.geo_filter()? {
        filters.push(json!({
            "geo_distance": {
                "distance": format!("{}m", geo.meters),
                "geolocation": {"lat": geo.center.lat, "lon": geo.center.lon}
            }
        }));
    }

    Ok(json!({
        "query": {"bool": {"filter": filters}},
        "from": query.from(),
        "size": query.page_size(),
        "track_total_hits": true
    }))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: u64,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SearchDocument,
}

/// Elasticsearch-backed `SearchBackend`
pub struct ElasticsearchClient {
    client: Client,
    config: SearchConfig,
}

impl ElasticsearchClient {
    /// Build a client without touching the cluster
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::Backend(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Build a client, wait for the cluster and make sure `index` exists
    pub async fn connect(config: SearchConfig, index: &str) -> Result<Self, SearchError> {
        let es = Self::new(config)?;
        es.wait_until_ready().await?;
        es.ensure_index(index).await?;
        Ok(es)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url, path)
    }

    async fn ping(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SearchError::Backend(format!(
                "ping returned {}",
                response.status()
            )))
        }
    }

    /// Ping with exponential backoff until `max_elapsed` runs out
    async fn wait_until_ready(&self) -> Result<(), SearchError> {
        let started = Instant::now();
        let mut backoff = self.config.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            let last_error = match self.ping().await {
                Ok(()) => {
                    tracing::info!(url = %self.config.url, attempt, "Connected to Elasticsearch");
                    return Ok(());
                }
                Err(e) => e.to_string(),
            };

            let elapsed = started.elapsed();
            if elapsed + backoff > self.config.max_elapsed {
                return Err(SearchError::ConnectTimeout {
                    elapsed_secs: elapsed.as_secs(),
                    last_error,
                });
            }

            tracing::info!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %last_error,
                "Trying to re-connect Elasticsearch"
            );
            sleep(backoff).await;
            attempt += 1;
            backoff = backoff
                .mul_f64(self.config.backoff_multiplier)
                .min(self.config.max_backoff);
        }
    }

    /// Create `index` with the node mapping unless it already exists
    pub async fn ensure_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .head(self.url(index))
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        match response.status() {
            StatusCode::OK => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(SearchError::Backend(format!(
                    "checking index {} returned {}",
                    index, status
                )))
            }
        }

        let response = self
            .client
            .put(self.url(index))
            .json(&node_index_mapping())
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Backend(format!(
                "creating index {} returned {}: {}",
                index, status, body
            )));
        }
        tracing::info!(index = %index, "Created search index");
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    async fn index_with_id(
        &self,
        index: &str,
        id: &str,
        doc: &SearchDocument,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .put(self.url(&format!("{}/_doc/{}", index, id)))
            .json(doc)
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(index = %index, id = %id, status = %status, "Failed to index document");
        Err(SearchError::Backend(format!(
            "indexing {} returned {}: {}",
            id, status, body
        )))
    }

    async fn search(&self, index: &str, query: &NodeQuery) -> Result<SearchResults, SearchError> {
        let body = build_search_body(query)?;
        let response = self
            .client
            .post(self.url(&format!("{}/_search?rest_total_hits_as_int=true", index)))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Backend(format!(
                "search returned {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Backend(format!("Failed to parse response: {}", e)))?;
        let total = parsed.hits.total;
        Ok(SearchResults {
            hits: parsed.hits.hits.into_iter().map(|hit| hit.source).collect(),
            total,
            total_pages: total_pages(total, query.page_size()),
        })
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(self.url(&format!("{}/_doc/{}", index, id)))
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        tracing::error!(index = %index, id = %id, status = %status, "Failed to delete document");
        Err(SearchError::Backend(format!(
            "deleting {} returned {}",
            id, status
        )))
    }
}
