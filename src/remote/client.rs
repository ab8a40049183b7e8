use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;

use super::backend::RemoteLayoutStorage;
use super::models::{NewRemoteLayout, RemoteLayout, RemoteLayoutUpdate, RemoteUpdateResult};
use crate::config::RemoteConfig;
use crate::storage::LayoutId;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// JSON-over-HTTP client for a layout server
pub struct HttpLayoutClient {
    client: Client,
    base_url: String,
    workspace: String,
    token: Option<String>,
}

impl HttpLayoutClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = config.server_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }
        if config.workspace.is_empty() || config.workspace.contains('/') {
            return Err(RemoteError::InvalidUrl(format!(
                "Invalid workspace name: {:?}",
                config.workspace
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            workspace: config.workspace.clone(),
            token: config.token.clone(),
        })
    }

    /// Build the URL of the workspace layout collection, or one of its items
    fn url(&self, item: Option<&str>) -> String {
        let collection = format!("{}/v1/workspaces/{}/layouts", self.base_url, self.workspace);
        match item {
            Some(item) => format!("{}/{}", collection, item),
            None => collection,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map error statuses shared by every endpoint
    async fn check_status(response: Response, resource: &str) -> Result<Response, RemoteError> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::AuthFailed),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(resource.to_string())),
            status if !status.is_success() => Err(RemoteError::Server {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl RemoteLayoutStorage for HttpLayoutClient {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    async fn get_layouts(&self) -> Result<Vec<RemoteLayout>, RemoteError> {
        let url = self.url(None);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check_status(response, &url).await?;
        Ok(response.json().await?)
    }

    async fn get_layout(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
        let url = self.url(Some(&id.to_string()));
        let response = self.authorize(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response, &url).await?;
        Ok(Some(response.json().await?))
    }

    async fn save_new_layout(&self, layout: NewRemoteLayout) -> Result<RemoteLayout, RemoteError> {
        let url = self.url(None);
        let response = self
            .authorize(self.client.post(&url).json(&layout))
            .send()
            .await?;
        let response = Self::check_status(response, &url).await?;
        Ok(response.json().await?)
    }

    async fn update_layout(
        &self,
        update: RemoteLayoutUpdate,
    ) -> Result<RemoteUpdateResult, RemoteError> {
        let url = self.url(Some(&update.external_id));
        let response = self
            .authorize(self.client.patch(&url).json(&update))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(RemoteUpdateResult::Conflict);
        }
        let response = Self::check_status(response, &url).await?;
        Ok(RemoteUpdateResult::Success(response.json().await?))
    }

    async fn delete_layout(&self, external_id: &str) -> Result<bool, RemoteError> {
        let url = self.url(Some(external_id));
        let response = self.authorize(self.client.delete(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check_status(response, &url).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str, workspace: &str) -> RemoteConfig {
        RemoteConfig {
            server_url: server_url.to_string(),
            workspace: workspace.to_string(),
            token: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_urls() {
        let client = HttpLayoutClient::new(&config("https://layouts.example.com/", "team")).unwrap();
        assert_eq!(
            client.url(None),
            "https://layouts.example.com/v1/workspaces/team/layouts"
        );
        assert_eq!(
            client.url(Some("abc")),
            "https://layouts.example.com/v1/workspaces/team/layouts/abc"
        );
        assert_eq!(client.workspace(), "team");
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(matches!(
            HttpLayoutClient::new(&config("ftp://example.com", "team")),
            Err(RemoteError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpLayoutClient::new(&config("https://example.com", "a/b")),
            Err(RemoteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_update_body_omits_external_id() {
        let update = RemoteLayoutUpdate {
            id: uuid::Uuid::nil(),
            external_id: "ext-1".to_string(),
            name: Some("Renamed".to_string()),
            data: None,
            saved_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "name": "Renamed",
                "savedAt": "1970-01-01T00:00:00Z",
            })
        );
    }
}
