//! Upstream API access.

use std::collections::HashSet;

use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::errors::NetworkError;

/// Single downloaded JSON object.
pub type Record = serde_json::Map<String, Value>;

type Result<T> = std::result::Result<T, NetworkError>;

/// Fetches ETags and payloads of resources under a common endpoint.
///
/// Every call makes a single attempt, there is no retry.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: ReqwestClient,
    endpoint: Url,
}

impl Fetcher {
    /// Create fetcher for resources under `endpoint`.
    pub fn new(client: ReqwestClient, mut endpoint: Url) -> Self {
        // Without trailing slash `Url::join` would replace the last segment
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of `resource` under the endpoint.
    pub fn resource_url(&self, resource: &str) -> Result<Url> {
        Ok(self.endpoint.join(resource)?)
    }

    /// Get current ETag of `resource`.
    ///
    /// `known_etag` is sent as `If-None-Match`. On `304 Not Modified` the known
    /// ETag is returned unless the response carries its own. A missing `ETag`
    /// header results in an empty string.
    pub async fn fetch_etag(&self, resource: &str, known_etag: Option<&str>) -> Result<String> {
        let url = self.resource_url(resource)?;
        let mut request = self.client.get(url.clone());
        if let Some(etag) = known_etag.filter(|etag| !etag.is_empty()) {
            request = request.header(IF_NONE_MATCH, etag);
        }

        trace!("GET {} (If-None-Match: {:?})", url, known_etag);
        let response = request.send().await?;
        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::NOT_MODIFIED {
            debug!("{} not modified", url);
            return Ok(etag.or(known_etag.map(str::to_string)).unwrap_or_default());
        }
        if !status.is_success() {
            return Err(NetworkError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!("{} has ETag {:?}", url, etag);
        Ok(etag.unwrap_or_default())
    }

    /// Download all records of `resource`.
    ///
    /// Accepted bodies are a JSON array of records, a page object with `results`
    /// and `next` (followed until `next` is null) or a single record object.
    pub async fn fetch_payload(&self, resource: &str) -> Result<Vec<Record>> {
        let mut next = Some(self.resource_url(resource)?);
        let mut visited = HashSet::new();
        let mut records = Vec::new();

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                return Err(malformed(&url, "pagination loops back to a visited page"));
            }
            match self.get_json(&url).await? {
                Value::Array(items) => records.extend(into_records(&url, items)?),
                Value::Object(mut page) if page.contains_key("results") => {
                    match page.remove("results") {
                        Some(Value::Array(items)) => records.extend(into_records(&url, items)?),
                        _ => return Err(malformed(&url, "'results' is not an array")),
                    }
                    next = match page.remove("next") {
                        Some(Value::String(link)) => Some(url.join(&link)?),
                        Some(Value::Null) | None => None,
                        Some(_) => return Err(malformed(&url, "'next' is not a URL")),
                    };
                }
                Value::Object(record) => records.push(record),
                _ => return Err(malformed(&url, "expected JSON array or object")),
            }
        }

        debug!("downloaded {} records of '{}'", records.len(), resource);
        Ok(records)
    }

    async fn get_json(&self, url: &Url) -> Result<Value> {
        trace!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| malformed(url, &err.to_string()))
    }
}

fn into_records(url: &Url, items: Vec<Value>) -> Result<Vec<Record>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(malformed(url, "record is not a JSON object")),
        })
        .collect()
}

fn malformed(url: &Url, reason: &str) -> NetworkError {
    NetworkError::MalformedPayload {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{page, serve};
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> Fetcher {
        let endpoint = Url::parse(&format!("{}/api", server.uri())).unwrap();
        Fetcher::new(ReqwestClient::new(), endpoint)
    }

    #[test]
    fn test_endpoint_gets_trailing_slash() {
        let fetcher = Fetcher::new(
            ReqwestClient::new(),
            Url::parse("https://swapi.dev/api").unwrap(),
        );
        assert_eq!(fetcher.endpoint().as_str(), "https://swapi.dev/api/");
        assert_eq!(
            fetcher.resource_url("people").unwrap().as_str(),
            "https://swapi.dev/api/people"
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_etag() {
        let server = MockServer::start().await;
        serve(&server, "people", "\"v1\"", json!([])).await;
        let etag = fetcher(&server)
            .fetch_etag("people", None)
            .await
            .expect("fetch etag");
        assert_eq!(etag, "\"v1\"");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_etag_not_modified() {
        let server = MockServer::start().await;
        serve(&server, "people", "\"v1\"", json!([])).await;
        let etag = fetcher(&server)
            .fetch_etag("people", Some("\"v1\""))
            .await
            .expect("fetch etag");
        assert_eq!(etag, "\"v1\"");
        assert!(logs_contain("not modified"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_etag_changed() {
        let server = MockServer::start().await;
        serve(&server, "people", "\"v2\"", json!([])).await;
        let etag = fetcher(&server)
            .fetch_etag("people", Some("\"v1\""))
            .await
            .expect("fetch etag");
        assert_eq!(etag, "\"v2\"");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_etag_missing_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/people"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let etag = fetcher(&server).fetch_etag("people", None).await.unwrap();
        assert_eq!(etag, "");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_etag_error_status() {
        let server = MockServer::start().await;
        let result = fetcher(&server).fetch_etag("people", None).await;
        assert!(matches!(
            result,
            Err(NetworkError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unreachable_endpoint() {
        let endpoint = Url::parse("http://127.0.0.1:9/api/").unwrap();
        let result = Fetcher::new(ReqwestClient::new(), endpoint)
            .fetch_etag("people", None)
            .await;
        assert!(matches!(result, Err(NetworkError::RequestError(_))));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_payload_array() {
        let server = MockServer::start().await;
        serve(&server, "items", "\"v1\"", json!([{"id": 1}, {"id": 2}])).await;
        let records = fetcher(&server).fetch_payload("items").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], json!(2));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_payload_single_object() {
        let server = MockServer::start().await;
        serve(&server, "status", "\"v1\"", json!({"id": 1, "ok": true})).await;
        let records = fetcher(&server).fetch_payload("status").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ok"], json!(true));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_payload_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/people"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([{"name": "Leia"}]))))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/people"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next": format!("{}/api/people?page=2", server.uri()),
                "results": [{"name": "Luke"}],
            })))
            .mount(&server)
            .await;

        let records = fetcher(&server).fetch_payload("people").await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Luke"), json!("Leia")]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_payload_pagination_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/people"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next": format!("{}/api/people", server.uri()),
                "results": [],
            })))
            .mount(&server)
            .await;
        let result = fetcher(&server).fetch_payload("people").await;
        assert!(matches!(result, Err(NetworkError::MalformedPayload { .. })));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fetch_payload_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/people"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        let result = fetcher(&server).fetch_payload("people").await;
        assert!(matches!(result, Err(NetworkError::MalformedPayload { .. })));
    }
}
