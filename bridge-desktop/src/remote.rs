//! Songbook API Client using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::{RemoteApi, RemoteResponse, ResourceKind},
};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Reqwest-based songbook API client
///
/// Provides the remote mutation endpoints with:
/// - Connection pooling via reqwest
/// - Bearer-token authentication supplied by the host
/// - TLS support by default
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpRemoteApi {
    /// Create a new API client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new API client with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent("chordbook-core/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        }
    }

    /// Attach a bearer token for authenticated requests
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self, resource: ResourceKind, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/api/{}/{}", self.base_url, resource.as_path(), id),
            None => format!("{}/api/{}", self.base_url, resource.as_path()),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<RemoteResponse> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        // Mutation endpoints reply with {id, version}; tolerate empty bodies.
        let body: Option<serde_json::Value> = response.json().await.ok();
        let server_id = body
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let server_version = body
            .as_ref()
            .and_then(|v| v.get("version"))
            .and_then(|v| v.as_i64());

        Ok(RemoteResponse {
            server_id,
            server_version,
        })
    }

    fn transport_error(err: reqwest::Error) -> BridgeError {
        match err.status() {
            Some(status) => BridgeError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => BridgeError::Unreachable(err.to_string()),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(
        &self,
        resource: ResourceKind,
        payload: &serde_json::Value,
    ) -> Result<RemoteResponse> {
        let url = self.url(resource, None);
        debug!(%url, resource = resource.as_str(), "POST remote resource");

        let response = self
            .authorize(self.client.post(&url).json(payload))
            .send()
            .await
            .map_err(Self::transport_error)?;

        self.handle_response(response).await
    }

    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<RemoteResponse> {
        let url = self.url(resource, Some(id));
        debug!(%url, resource = resource.as_str(), "PUT remote resource");

        let response = self
            .authorize(self.client.put(&url).json(payload))
            .send()
            .await
            .map_err(Self::transport_error)?;

        self.handle_response(response).await
    }

    async fn delete(&self, resource: ResourceKind, id: &str) -> Result<()> {
        let url = self.url(resource, Some(id));
        debug!(%url, resource = resource.as_str(), "DELETE remote resource");

        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .map_err(Self::transport_error)?;

        self.handle_response(response).await.map(|_| ())
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BridgeError::Remote {
                status: response.status().as_u16(),
                message: "health probe failed".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let api = HttpRemoteApi::new("https://songbook.example/");
        assert_eq!(
            api.url(ResourceKind::Song, None),
            "https://songbook.example/api/songs"
        );
        assert_eq!(
            api.url(ResourceKind::Setlist, Some("abc")),
            "https://songbook.example/api/setlists/abc"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_unreachable() {
        let api = HttpRemoteApi::with_timeout("http://127.0.0.1:1", Duration::from_secs(1));
        let err = api.probe().await.unwrap_err();
        assert!(matches!(err, BridgeError::Unreachable(_)));
    }
}
