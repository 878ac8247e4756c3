//! OAuth 2.0 authorization code flow with PKCE and a loopback redirect.
//!
//! 1. Generate a code verifier, its S256 challenge and a random state
//! 2. Bind a listener on `127.0.0.1` within the configured port range
//! 3. Open the consent page in the browser
//! 4. Accept the redirect and pull `code` and `state` out of the query
//! 5. Exchange the code and verifier for tokens

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const CODE_VERIFIER_LENGTH: usize = 32;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const PAGE_OK: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization successful</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const PAGE_FAILED: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization failed</h1><p>You can close this window.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token endpoint client for one registered OAuth application.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(credentials: OAuthCredentials, timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {}", e))
                    .with_provider("google")
            })?;
        Ok(Self {
            credentials,
            http_client,
        })
    }

    /// Runs the interactive consent flow and returns fresh tokens.
    pub async fn authorize(
        &self,
        scopes: &[String],
        port_range: (u16, u16),
    ) -> ProviderResult<TokenInfo> {
        let pkce = PkceFlow::new();
        let (listener, port) = bind_loopback(port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(&self.credentials.client_id, &redirect_uri, scopes);

        info!("opening browser for Google authorization");
        debug!(url = %auth_url, "authorization URL");
        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nOpen this URL in your browser:\n\n{}\n", auth_url);
        }

        let callback = tokio::time::timeout(CALLBACK_TIMEOUT, accept_callback(&listener))
            .await
            .map_err(|_| {
                ProviderError::authentication("timed out waiting for the OAuth redirect")
                    .with_provider("google")
            })??;

        if callback.state != pkce.state {
            return Err(
                ProviderError::authentication("OAuth state mismatch").with_provider("google")
            );
        }

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", callback.code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let response = self.token_request(&params, "token exchange").await?;
        info!("obtained Google tokens");
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            scopes.to_vec(),
        ))
    }

    /// Trades a refresh token for a new access token.
    pub async fn refresh(&self, token: TokenInfo) -> ProviderResult<TokenInfo> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            ProviderError::authentication("no refresh token, run `timetable auth google`")
                .with_provider("google")
        })?;
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.token_request(&params, "token refresh").await?;
        info!("refreshed Google access token");
        Ok(token.refreshed(
            response.access_token,
            response.expires_in,
            response.refresh_token,
        ))
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", what, e))
                    .with_provider("google")
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_provider("google")
        })?;
        if !status.is_success() {
            return Err(
                ProviderError::authentication(format!("{} failed ({}): {}", what, status, body))
                    .with_provider("google"),
            );
        }
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
                .with_provider("google")
        })
    }
}

async fn bind_loopback(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!(port, "bound loopback listener");
            return Ok((listener, port));
        }
    }
    Err(ProviderError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    ))
    .with_provider("google"))
}

/// Accepts connections until one carries the OAuth redirect.
async fn accept_callback(listener: &TcpListener) -> ProviderResult<Callback> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "loopback connection");
        if let Some(result) = handle_connection(stream).await {
            return result;
        }
    }
}

async fn handle_connection(mut stream: TcpStream) -> Option<ProviderResult<Callback>> {
    let (read_half, mut write_half) = stream.split();
    let mut request_line = String::new();
    BufReader::new(read_half)
        .read_line(&mut request_line)
        .await
        .ok()?;

    let result = parse_request_line(&request_line)?;
    let page = if result.is_ok() { PAGE_OK } else { PAGE_FAILED };
    let _ = write_half.write_all(page.as_bytes()).await;
    let _ = write_half.flush().await;
    Some(result)
}

#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: String,
}

/// Parses `GET /callback?code=..&state=.. HTTP/1.1`.
///
/// Returns `None` for requests that are not the redirect (favicon requests).
fn parse_request_line(line: &str) -> Option<ProviderResult<Callback>> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let query = target.strip_prefix("/callback")?;
    let query = query.strip_prefix('?').unwrap_or("");

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            _ => {}
        }
    }

    let result = match (error, code) {
        (Some(error), _) => Err(ProviderError::authentication(format!(
            "authorization denied: {}",
            error
        ))),
        (None, Some(code)) => Ok(Callback {
            code,
            state: state.unwrap_or_default(),
        }),
        (None, None) => Err(ProviderError::authentication(
            "missing authorization code in callback",
        )),
    };
    Some(result.map_err(|e| e.with_provider("google")))
}

/// RFC 7636 verifier, challenge and CSRF state.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_values() {
        let flow = PkceFlow::new();
        assert_eq!(flow.verifier.len(), 43);
        assert_eq!(
            flow.challenge,
            URL_SAFE_NO_PAD.encode(Sha256::digest(flow.verifier.as_bytes()))
        );
        assert_ne!(flow.state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_requests_offline_access() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            "id.apps.googleusercontent.com",
            "http://127.0.0.1:8080/callback",
            &["https://www.googleapis.com/auth/calendar".to_string()],
        );
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn redirect_is_parsed() {
        let callback = parse_request_line("GET /callback?state=s%2F1&code=4%2F0Ab HTTP/1.1\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            callback,
            Callback {
                code: "4/0Ab".into(),
                state: "s/1".into()
            }
        );
    }

    #[test]
    fn denial_and_noise() {
        let denied = parse_request_line("GET /callback?error=access_denied HTTP/1.1").unwrap();
        assert!(denied.unwrap_err().message().contains("access_denied"));
        assert!(parse_request_line("GET /callback HTTP/1.1").unwrap().is_err());
        assert!(parse_request_line("GET /favicon.ico HTTP/1.1").is_none());
        assert!(parse_request_line("POST /callback?code=x HTTP/1.1").is_none());
        assert!(parse_request_line("").is_none());
    }

    #[tokio::test]
    async fn loopback_binds_within_range() {
        let (listener, port) = bind_loopback((0, 0)).await.unwrap();
        assert_eq!(port, 0);
        drop(listener);
    }
}
