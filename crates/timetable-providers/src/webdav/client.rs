//! HTTP client for WebDAV listing and downloads.

use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{ProviderError, ProviderResult};

use super::auth::{DigestAuth, basic_auth};
use super::config::WebDavConfig;

/// Low-level WebDAV client.
///
/// Sends requests unauthenticated first and answers a 401 challenge with
/// Digest or Basic credentials. A negotiated Digest state is reused for the
/// following requests.
pub struct WebDavClient {
    client: Client,
    config: WebDavConfig,
    digest_auth: Option<DigestAuth>,
}

impl WebDavClient {
    pub fn new(config: WebDavConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {}", e))
                    .with_provider("webdav")
            })?;

        Ok(Self {
            client,
            config,
            digest_auth: None,
        })
    }

    /// PROPFIND with the given depth; returns the multistatus body.
    pub async fn propfind(&mut self, url: &str, body: &str, depth: u8) -> ProviderResult<String> {
        let bytes = self.request("PROPFIND", url, Some(body), Some(depth)).await?;
        String::from_utf8(bytes).map_err(|e| {
            ProviderError::invalid_response("PROPFIND response is not UTF-8")
                .with_provider("webdav")
                .with_source(e)
        })
    }

    /// GET; returns the raw body.
    pub async fn get(&mut self, url: &str) -> ProviderResult<Vec<u8>> {
        self.request("GET", url, None, None).await
    }

    async fn request(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        depth: Option<u8>,
    ) -> ProviderResult<Vec<u8>> {
        // Reuse a negotiated digest instead of paying for another 401.
        if self.digest_auth.is_some() {
            return self.send_authenticated(method, url, body, depth).await;
        }

        let response = self.send(method, url, body, depth, None).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return handle_response(response).await;
        }

        let challenge = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();
        debug!(challenge = %challenge, "received 401, authenticating");

        if let Some(digest) = DigestAuth::parse(&challenge) {
            self.digest_auth = Some(digest);
            return self.send_authenticated(method, url, body, depth).await;
        }
        if challenge.contains("Basic") || self.config.has_credentials() {
            return self.send_authenticated(method, url, body, depth).await;
        }

        Err(
            ProviderError::authentication("Server requires authentication but no valid method found")
                .with_provider("webdav"),
        )
    }

    async fn send_authenticated(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&str>,
        depth: Option<u8>,
    ) -> ProviderResult<Vec<u8>> {
        let Some(credentials) = &self.config.credentials else {
            return Err(
                ProviderError::authentication("Credentials required but not configured")
                    .with_provider("webdav"),
            );
        };

        let uri_path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        let authorization = match self.digest_auth.as_mut() {
            Some(digest) => digest.authorize(
                method,
                &uri_path,
                &credentials.username,
                &credentials.password,
            ),
            None => basic_auth(&credentials.username, &credentials.password),
        };

        let response = self
            .send(method, url, body, depth, Some(authorization))
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Stale nonce or wrong password; renegotiate on the next call.
            self.digest_auth = None;
        }
        handle_response(response).await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<&str>,
        depth: Option<u8>,
        authorization: Option<String>,
    ) -> ProviderResult<Response> {
        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ProviderError::internal(format!("Invalid HTTP method: {}", method)))?;

        let mut request = self.client.request(http_method, url);
        if let Some(d) = depth {
            request = request.header("Depth", d.to_string());
        }
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }
        if let Some(b) = body {
            request = request
                .header("Content-Type", "application/xml; charset=utf-8")
                .body(b.to_string());
        }

        trace!(method = %method, url = %url, "sending request");

        request.send().await.map_err(|e| {
            ProviderError::network(format!("Request failed: {}", e))
                .with_provider("webdav")
                .with_source(e)
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.url_str()
    }

    pub fn config(&self) -> &WebDavConfig {
        &self.config
    }
}

/// Maps the status onto a [`ProviderError`] or reads the body.
async fn handle_response(response: Response) -> ProviderResult<Vec<u8>> {
    let status = response.status();
    trace!(status = %status, "received response");

    if status.is_success() {
        return response.bytes().await.map(|b| b.to_vec()).map_err(|e| {
            ProviderError::network(format!("failed to read response body: {e}"))
                .with_provider("webdav")
        });
    }

    let body = response.text().await.unwrap_or_default();
    if !status.is_client_error() && !status.is_server_error() {
        warn!(status = %status, "unexpected response status");
    }
    Err(ProviderError::from_status(status.as_u16(), &body).with_provider("webdav"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn client_creation() {
        let config = WebDavConfig::new("https://files.example.org/dav/")
            .unwrap()
            .with_credentials("user", "pass")
            .with_timeout(Duration::from_secs(10));
        let client = WebDavClient::new(config).unwrap();
        assert_eq!(client.base_url(), "https://files.example.org/dav/");
        assert!(client.config().has_credentials());
    }
}
