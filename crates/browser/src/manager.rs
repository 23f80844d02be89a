//! HTTP client for the browser-manager service.
//!
//! The manager owns the actual browser profiles; we only ask it to open a
//! profile (returning a CDP debug endpoint) and to list the profiles it
//! knows about. Its internals are opaque.

use std::time::Duration;

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::error::BrowserError;

/// Status code the manager reports for a profile with a live browser.
const STATUS_RUNNING: i64 = 1;

/// Page size used when enumerating profiles.
const LIST_PAGE_SIZE: u32 = 200;

/// A browser profile as reported by the manager.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: i64,
}

impl BrowserProfile {
    /// Whether the profile's browser is currently running and connectable.
    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest {
    page: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenData {
    #[serde(default)]
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListData {
    #[serde(default)]
    list: Vec<BrowserProfile>,
}

/// Client for the browser-manager REST API.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ManagerClient {
    /// Create a client for the manager at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BrowserError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BrowserError::ManagerUnreachable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Ask the manager to open the profile named by `identity` and return
    /// the CDP debug endpoint to attach to.
    pub async fn open(&self, identity: &str) -> Result<String, BrowserError> {
        let url = format!("{}/browser/open", self.base_url);
        debug!(identity, url, "requesting debug endpoint");

        let response = self
            .http
            .post(&url)
            .json(&OpenRequest { id: identity })
            .send()
            .await
            .map_err(|e| BrowserError::ManagerUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrowserError::ManagerRejected(format!(
                "open returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope<OpenData> = response
            .json()
            .await
            .map_err(|e| BrowserError::ManagerRejected(format!("malformed response: {e}")))?;

        if !envelope.success {
            return Err(BrowserError::ManagerRejected(
                envelope.msg.unwrap_or_else(|| "open reported failure".into()),
            ));
        }

        let endpoint = envelope
            .data
            .and_then(|d| d.endpoint)
            .filter(|e| !e.is_empty())
            .ok_or(BrowserError::MissingEndpoint)?;

        info!(identity, endpoint, "obtained debug endpoint");
        Ok(endpoint)
    }

    /// List profiles whose browser is currently running. Stopped profiles are
    /// not connectable and are filtered out here.
    pub async fn list_running(&self) -> Result<Vec<BrowserProfile>, BrowserError> {
        let url = format!("{}/browser/list", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&ListRequest {
                page: 0,
                page_size: LIST_PAGE_SIZE,
            })
            .send()
            .await
            .map_err(|e| BrowserError::ManagerUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BrowserError::ManagerRejected(format!(
                "list returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope<ListData> = response
            .json()
            .await
            .map_err(|e| BrowserError::ManagerRejected(format!("malformed response: {e}")))?;

        if !envelope.success {
            return Err(BrowserError::ManagerRejected(
                envelope.msg.unwrap_or_else(|| "list reported failure".into()),
            ));
        }

        let mut profiles = envelope.data.map(|d| d.list).unwrap_or_default();
        let total = profiles.len();
        profiles.retain(BrowserProfile::is_running);

        debug!(running = profiles.len(), total, "listed manager profiles");
        Ok(profiles)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> ManagerClient {
        ManagerClient::new(server.url(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn open_returns_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/browser/open")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"endpoint":"ws://127.0.0.1:9222/devtools/browser/abc"}}"#)
            .create_async()
            .await;

        let endpoint = client(&server).open("profile-1").await.unwrap();
        assert_eq!(endpoint, "ws://127.0.0.1:9222/devtools/browser/abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn open_rejected_when_success_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/browser/open")
            .with_status(200)
            .with_body(r#"{"success":false,"msg":"profile not found"}"#)
            .create_async()
            .await;

        let err = client(&server).open("missing").await.unwrap_err();
        assert!(matches!(err, BrowserError::ManagerRejected(msg) if msg.contains("profile not found")));
    }

    #[tokio::test]
    async fn open_fails_on_missing_endpoint_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/browser/open")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{}}"#)
            .create_async()
            .await;

        let err = client(&server).open("profile-1").await.unwrap_err();
        assert!(matches!(err, BrowserError::MissingEndpoint));
    }

    #[tokio::test]
    async fn open_tolerates_missing_data_object() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/browser/open")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let err = client(&server).open("profile-1").await.unwrap_err();
        assert!(matches!(err, BrowserError::MissingEndpoint));
    }

    #[tokio::test]
    async fn open_fails_on_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/browser/open")
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server).open("profile-1").await.unwrap_err();
        assert!(matches!(err, BrowserError::ManagerRejected(_)));
    }

    #[tokio::test]
    async fn list_keeps_only_running_profiles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/browser/list")
            .with_status(200)
            .with_body(
                r#"{"success":true,"data":{"list":[
                    {"id":"a","name":"alpha","status":1},
                    {"id":"b","name":"bravo","status":0},
                    {"id":"c","name":"charlie","status":1}
                ]}}"#,
            )
            .create_async()
            .await;

        let profiles = client(&server).list_running().await.unwrap();
        let ids: Vec<_> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[tokio::test]
    async fn unreachable_manager_is_a_connection_error() {
        // Nothing listens on this port.
        let client = ManagerClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = client.open("profile-1").await.unwrap_err();
        assert!(matches!(err, BrowserError::ManagerUnreachable(_)));
    }
}
