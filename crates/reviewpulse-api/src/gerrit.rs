use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::retry::{is_retryable_status, with_retry, RetryConfig, Retryable};
use crate::types::{AccountInfo, ChangeInfo, QueryOption};

/// Every JSON body Gerrit sends starts with this line to defeat XSSI
const XSSI_PREFIX: &str = ")]}'";

#[derive(Error, Debug)]
pub enum GerritError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl Retryable for GerritError {
    fn is_retryable(&self) -> bool {
        match self {
            GerritError::RateLimitExceeded | GerritError::RequestFailed(_) => true,
            GerritError::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GerritError::NotFound(_)
            | GerritError::AuthRequired
            | GerritError::Rejected(_)
            | GerritError::ParseError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GerritError>;

/// HTTP credentials for the `/a/` endpoints
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub http_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("http_password", &"<redacted>")
            .finish()
    }
}

pub struct GerritClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    retry_config: RetryConfig,
}

impl GerritClient {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("reviewpulse/0.1.0"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            retry_config: RetryConfig::default(),
        }
    }

    /// Create client with custom retry configuration
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated endpoints live under `/a/`
    fn endpoint(&self, path: &str) -> String {
        if self.credentials.is_some() {
            format!("{}/a/{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn basic_auth_header(&self) -> Option<String> {
        self.credentials.as_ref().map(|creds| {
            let raw = format!("{}:{}", creds.username, creds.http_password);
            let encoded =
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw.as_bytes());
            format!("Basic {}", encoded)
        })
    }

    /// Run a change query: `GET /changes/?q=<query>&n=<limit>&S=<start>&o=...`
    pub async fn query_changes(
        &self,
        query: &str,
        limit: u32,
        start: u32,
        options: &[QueryOption],
    ) -> Result<Vec<ChangeInfo>> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("n", limit.to_string()),
            ("S", start.to_string()),
        ];
        params.extend(options.iter().map(|o| ("o", o.as_str().to_string())));

        debug!("Querying changes '{}' (n={}, S={})", query, limit, start);
        self.get_json("changes/", &params, query).await
    }

    /// The account the credentials belong to
    pub async fn get_self_account(&self) -> Result<AccountInfo> {
        if self.credentials.is_none() {
            return Err(GerritError::AuthRequired);
        }
        self.get_json("accounts/self", &[], "accounts/self").await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = self.endpoint(path);
        let auth_header = self.basic_auth_header();

        with_retry(&self.retry_config, || async {
            let mut request = self.client.get(&url).query(params);

            if let Some(ref auth) = auth_header {
                request = request.header(reqwest::header::AUTHORIZATION, auth);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == 404 {
                return Err(GerritError::NotFound(what.to_string()));
            }

            if status == 401 || status == 403 {
                return Err(GerritError::AuthRequired);
            }

            if status == 429 {
                return Err(GerritError::RateLimitExceeded);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if is_retryable_status(status) {
                    return Err(GerritError::RequestFailed(format!(
                        "Status {}: {}",
                        status, body
                    )));
                }
                return Err(GerritError::Rejected(format!(
                    "{} (status {}: {})",
                    what,
                    status,
                    body.trim()
                )));
            }

            let body = response.text().await?;
            parse_body(&body)
        })
        .await
    }
}

/// Strip the XSSI guard line and decode the remaining JSON
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let json = body
        .trim_start()
        .strip_prefix(XSSI_PREFIX)
        .unwrap_or(body);
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GerritClient::new("https://review.example.org/", None);
        assert_eq!(client.base_url(), "https://review.example.org");
        assert_eq!(
            client.endpoint("changes/"),
            "https://review.example.org/changes/"
        );
        assert!(client.basic_auth_header().is_none());
    }

    #[test]
    fn test_with_retry_config() {
        let client = GerritClient::new("https://review.example.org", None).with_retry_config(
            RetryConfig {
                max_retries: 7,
                ..RetryConfig::default()
            },
        );
        assert_eq!(client.retry_config.max_retries, 7);
    }

    #[test]
    fn test_authenticated_endpoint_and_header() {
        let client = GerritClient::new(
            "https://review.example.org",
            Some(Credentials {
                username: "jdoe".to_string(),
                http_password: "secret".to_string(),
            }),
        );
        assert_eq!(
            client.endpoint("changes/"),
            "https://review.example.org/a/changes/"
        );
        let header = client.basic_auth_header().unwrap();
        assert!(header.starts_with("Basic "));
        // "jdoe:secret"
        assert_eq!(header, "Basic amRvZTpzZWNyZXQ=");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "jdoe".to_string(),
            http_password: "secret".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("jdoe"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_parse_body_strips_xssi_prefix() {
        let body = ")]}'\n[{\"_account_id\": 7}]";
        let accounts: Vec<AccountInfo> = parse_body(body).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].account_id, 7);
    }

    #[test]
    fn test_parse_body_without_prefix() {
        let accounts: Vec<AccountInfo> = parse_body("[]").unwrap();
        assert!(accounts.is_empty());
    }

    #[test]
    fn test_parse_body_rejects_garbage() {
        let result: Result<Vec<AccountInfo>> = parse_body(")]}'\nnot json");
        assert!(matches!(result, Err(GerritError::ParseError(_))));
    }

    #[test]
    fn test_error_retryability() {
        assert!(GerritError::RateLimitExceeded.is_retryable());
        assert!(GerritError::RequestFailed("502".into()).is_retryable());
        assert!(!GerritError::AuthRequired.is_retryable());
        assert!(!GerritError::NotFound("x".into()).is_retryable());
    }
}
