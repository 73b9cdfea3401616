//! HTTP document loader and reachability probe
//!
//! Both wrap a `reqwest::Client` with a hard request timeout. Neither retries;
//! a failed fetch is an outcome the caller records, not something to hide.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::deletion::{ProbeOutcome, ReachabilityProbe};
use crate::error::FetchError;
use crate::loader::DocumentLoader;

fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))
}

/// Loads profiles and schemas over HTTP
#[derive(Clone)]
pub struct HttpDocumentLoader {
    client: Client,
}

impl HttpDocumentLoader {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Bounded GET used before deleting a node
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
        };
        let status = response.status().as_u16();
        // A body cut off mid-read is as ambiguous as no answer at all.
        match response.bytes().await {
            Ok(body) => ProbeOutcome::Response {
                status,
                json_body: serde_json::from_slice::<serde::de::IgnoredAny>(&body).is_ok(),
            },
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_loader_reads_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"Acme"}"#))
            .mount(&server)
            .await;

        let loader = HttpDocumentLoader::new(timeout()).unwrap();
        let doc = loader
            .load_json(&format!("{}/profile.json", server.uri()))
            .await
            .unwrap();
        assert_eq!(doc["name"], "Acme");
    }

    #[tokio::test]
    async fn test_loader_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let loader = HttpDocumentLoader::new(timeout()).unwrap();
        let err = loader
            .get_bytes(&format!("{}/profile.json", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_probe_classifies_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"a":1}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(timeout()).unwrap();
        assert_eq!(
            probe.probe(&format!("{}/live.json", server.uri())).await,
            ProbeOutcome::Response {
                status: 200,
                json_body: true
            }
        );
        assert_eq!(
            probe.probe(&format!("{}/html", server.uri())).await,
            ProbeOutcome::Response {
                status: 200,
                json_body: false
            }
        );
        assert_eq!(
            probe.probe(&format!("{}/gone", server.uri())).await,
            ProbeOutcome::Response {
                status: 404,
                json_body: false
            }
        );
    }

    #[tokio::test]
    async fn test_probe_transport_error_is_unreachable() {
        let probe = HttpProbe::new(Duration::from_millis(500)).unwrap();
        let outcome = probe.probe("http://127.0.0.1:1/profile.json").await;
        assert!(matches!(outcome, ProbeOutcome::Unreachable(_)));
    }
}
