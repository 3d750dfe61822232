// src/remote/mod.rs

//! HTTP client for the AnalyLit analysis server.
//!
//! The sole network caller for authenticated server operations. A non-2xx
//! status is always an error; nothing in here retries.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{
    BibliographicItem, ConnectorConfig, ExportType, HealthProbe, HttpSettings, ImportOutcome,
    ImportType, Project,
};

/// Client bound to one server URL and optional API key.
pub struct RemoteClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteClient {
    /// Create a client for the given server URL (trailing slashes are
    /// stripped) and API key (empty means unauthenticated).
    pub fn new(
        settings: &HttpSettings,
        server_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let base_url = server_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AppError::config("no server URL configured"));
        }
        let api_key = api_key.into();
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: (!api_key.trim().is_empty()).then_some(api_key),
        })
    }

    /// Create a client from the saved user configuration.
    pub fn from_config(settings: &HttpSettings, config: &ConnectorConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(AppError::config(
                "no server URL configured; save the connection settings first",
            ));
        }
        Self::new(settings, config.normalized_server_url(), &config.api_key)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Map a non-2xx response to `AppError::Http`.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(AppError::http(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown status"),
        ))
    }

    /// Lightweight health probe.
    ///
    /// Never errors: a transport failure reports `connected: false` with
    /// status 0, a non-2xx reports the status.
    pub async fn health(&self) -> HealthProbe {
        match self.request(Method::GET, "/api/health").send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    HealthProbe::ok(status.as_u16())
                } else {
                    HealthProbe::failed(
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown status"),
                    )
                }
            }
            Err(e) => HealthProbe::failed(0, e.to_string()),
        }
    }

    /// List the projects available on the server.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        let response = self.request(Method::GET, "/api/projects").send().await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    /// Import items into a project.
    ///
    /// Extension-staged items go through their own endpoint; everything
    /// else uses the library import.
    pub async fn import_items(
        &self,
        project_id: &str,
        items: &[BibliographicItem],
        import_type: ImportType,
    ) -> Result<ImportOutcome> {
        let endpoint = match import_type {
            ImportType::Extension => "import-from-extension",
            _ => "import-zotero",
        };
        let path = format!("/api/projects/{project_id}/{endpoint}");
        let body = json!({
            "items": items,
            "importType": import_type,
        });
        let response = self.request(Method::POST, &path).json(&body).send().await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    /// Pull a server-side export.
    pub async fn export(&self, project_id: &str, export_type: ExportType) -> Result<Value> {
        let endpoint = match export_type {
            ExportType::Results => "export-validated-results",
            ExportType::Bibliography => "export-bibliography",
        };
        let path = format!("/api/projects/{project_id}/{endpoint}");
        let response = self.request(Method::GET, &path).send().await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    /// URL of the server's search view for an item title.
    pub fn search_view_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        format!("{}/search?q={}", self.base_url, encoded)
    }

    /// Number of records in an export payload (array length, else 1).
    pub fn exported_count(data: &Value) -> usize {
        match data {
            Value::Array(entries) => entries.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: &str) -> RemoteClient {
        RemoteClient::new(&HttpSettings::default(), server.uri(), api_key).unwrap()
    }

    #[tokio::test]
    async fn health_ok_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let probe = client(&server, "").health().await;
        assert!(probe.connected);
        assert_eq!(probe.status, 200);
    }

    #[tokio::test]
    async fn health_reports_server_error_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let probe = client(&server, "").health().await;
        assert!(!probe.connected);
        assert_eq!(probe.status, 500);
    }

    #[tokio::test]
    async fn health_reports_transport_failure_as_status_zero() {
        // Nothing listens here
        let client =
            RemoteClient::new(&HttpSettings::default(), "http://127.0.0.1:1", "").unwrap();
        let probe = client.health().await;
        assert!(!probe.connected);
        assert_eq!(probe.status, 0);
    }

    #[tokio::test]
    async fn projects_sends_bearer_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/projects"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": "p1", "name": "Review"}])),
            )
            .mount(&server)
            .await;

        let projects = client(&server, "secret-key").projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "p1");
    }

    #[tokio::test]
    async fn import_posts_items_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/p1/import-zotero"))
            .and(body_partial_json(json!({"importType": "selected"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imported": 2})))
            .mount(&server)
            .await;

        let items = vec![
            BibliographicItem::new("A", ItemType::JournalArticle),
            BibliographicItem::new("B", ItemType::Book),
        ];
        let outcome = client(&server, "")
            .import_items("p1", &items, ImportType::Selected)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 2);
    }

    #[tokio::test]
    async fn extension_import_uses_its_own_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/p1/import-from-extension"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imported": 1})))
            .mount(&server)
            .await;

        let items = vec![BibliographicItem::new("A", ItemType::Document)];
        let outcome = client(&server, "")
            .import_items("p1", &items, ImportType::Extension)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 1);
    }

    #[tokio::test]
    async fn non_2xx_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/projects/p1/export-bibliography"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, "")
            .export("p1", ExportType::Bibliography)
            .await
            .unwrap_err();
        match err {
            AppError::Http { status, status_text } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn export_returns_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/projects/p1/export-validated-results"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
            )
            .mount(&server)
            .await;

        let data = client(&server, "")
            .export("p1", ExportType::Results)
            .await
            .unwrap();
        assert_eq!(RemoteClient::exported_count(&data), 2);
    }

    #[test]
    fn trailing_slashes_stripped_and_empty_url_rejected() {
        let client =
            RemoteClient::new(&HttpSettings::default(), "https://x.example///", "").unwrap();
        assert_eq!(client.base_url, "https://x.example");
        assert!(RemoteClient::new(&HttpSettings::default(), "", "").is_err());
    }

    #[test]
    fn search_view_url_encodes_query() {
        let client =
            RemoteClient::new(&HttpSettings::default(), "https://x.example", "").unwrap();
        assert_eq!(
            client.search_view_url("deep learning"),
            "https://x.example/search?q=deep+learning"
        );
    }
}
