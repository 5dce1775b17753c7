// ABOUTME: HTTP client for the attendance API
// ABOUTME: One outbound call per method, no internal retries

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use url::Url;

use super::models::{ApiResponse, AttendanceEnvelope, Credentials};
use crate::error::SyncError;
use crate::mapper::WireRecord;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Build a client for `base_address`. Relative endpoint paths resolve
    /// beneath it, so a missing trailing slash is added.
    pub fn new(base_address: &str) -> Result<Self, SyncError> {
        let base_url = parse_base_address(base_address)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::InvalidBaseAddress {
                address: base_address.to_string(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET ping?access_token=<token>`
    pub async fn ping(&self, token: &str) -> Result<ApiResponse> {
        let request = self
            .client
            .get(self.endpoint("ping")?)
            .query(&[("access_token", token)]);
        self.execute("ping", request).await
    }

    /// `POST sessions` with `{login, password}`
    pub async fn create_session(&self, credentials: &Credentials) -> Result<ApiResponse> {
        let request = self.client.post(self.endpoint("sessions")?).json(credentials);
        self.execute("login", request).await
    }

    /// `DELETE sessions?access_token=<token>`
    pub async fn delete_session(&self, token: &str) -> Result<ApiResponse> {
        let request = self
            .client
            .delete(self.endpoint("sessions")?)
            .query(&[("access_token", token)]);
        self.execute("logout", request).await
    }

    /// `POST device_attendances?access_token=<token>` with `{record: [...]}`
    pub async fn post_attendances(
        &self,
        token: &str,
        records: &[WireRecord],
    ) -> Result<ApiResponse> {
        let request = self
            .client
            .post(self.endpoint("device_attendances")?)
            .query(&[("access_token", token)])
            .json(&AttendanceEnvelope { record: records });
        self.execute("upload", request).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {} under {}", path, self.base_url))
    }

    /// Send the request and decode the JSON body. Non-2xx answers still carry
    /// `{success:"false", error}` so the body is decoded whenever possible.
    async fn execute(&self, operation: &str, request: RequestBuilder) -> Result<ApiResponse> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", operation))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response body", operation))?;

        tracing::debug!("{} answered {} ({} bytes)", operation, status, body.len());

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => Err(e)
                .with_context(|| format!("Failed to parse {} response: {}", operation, body)),
            Err(_) => anyhow::bail!(
                "{} failed with status {}: {}",
                operation,
                status,
                body.trim()
            ),
        }
    }
}

fn parse_base_address(base_address: &str) -> Result<Url, SyncError> {
    let trimmed = base_address.trim();
    let invalid = |reason: String| SyncError::InvalidBaseAddress {
        address: base_address.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("base address is empty".to_string()));
    }

    let mut url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http(s) URL".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_base_address_gets_trailing_slash() {
        let client = ApiClient::new("https://api.example.com/v1").unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.example.com/v1/");
        assert_eq!(
            client.endpoint("ping").unwrap().as_str(),
            "https://api.example.com/v1/ping"
        );
    }

    #[test]
    fn test_invalid_base_addresses() {
        for address in ["", "   ", "not a url", "ftp://files.example.com/"] {
            let err = ApiClient::new(address).err().unwrap();
            assert!(
                matches!(err, SyncError::InvalidBaseAddress { .. }),
                "{:?} should be rejected",
                address
            );
        }
    }

    #[tokio::test]
    async fn test_ping_sends_token_as_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_query(Matcher::UrlEncoded(
                "access_token".into(),
                "tok-1".into(),
            ))
            .with_status(200)
            .with_body(r#"{"success":"true"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client.ping("tok-1").await.unwrap();

        mock.assert_async().await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_error_status_with_json_body_is_decoded() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/sessions")
            .with_status(401)
            .with_body(r#"{"success":"false","error":"invalid credentials"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .create_session(&Credentials {
                login: "a".to_string(),
                password: "b".to_string(),
            })
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.error_message(), "invalid credentials");
    }

    #[tokio::test]
    async fn test_error_status_without_json_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/sessions")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.delete_session("tok").await.unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("502"));
        assert!(text.contains("Bad Gateway"));
    }
}
