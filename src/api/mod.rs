//! REST access to the remote platform.

pub mod services;
pub mod v1;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::credentials::DatabricksConfig;

pub const API_V2_PREFIX: &str = "/api/2.0";
pub const API_V1_PREFIX: &str = "/api/1.2";

const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The platform answered with a non-success status.
    #[error("{method} {path} failed ({status}): {message}")]
    Http {
        method: String,
        path: String,
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Http {
                status, error_code, ..
            } => {
                *status == StatusCode::NOT_FOUND.as_u16()
                    || error_code.as_deref() == Some(RESOURCE_DOES_NOT_EXIST)
            }
            _ => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Anything that can perform a query against the platform's REST API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform_query(
        &self,
        method: Method,
        path: &str,
        data: Option<Value>,
    ) -> ApiResult<Value>;
}

#[derive(Debug, Clone)]
enum Auth {
    Token(String),
    Basic { username: String, password: String },
}

#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    error_code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

/// Authenticated client bound to one API version prefix.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    url: String,
    auth: Option<Auth>,
}

impl ApiClient {
    pub fn from_config(config: &DatabricksConfig, command_name: &str) -> ApiResult<Self> {
        let user_agent = format!("{}{}", command_name, env!("CARGO_PKG_VERSION"));
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) => Some(Auth::Token(token.clone())),
            (None, Some(username), Some(password)) => Some(Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            http,
            url: format!("{}{}", config.host.trim_end_matches('/'), API_V2_PREFIX),
            auth,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A copy of this client with one API version segment swapped for another.
    pub fn with_api_prefix(&self, from: &str, to: &str) -> Self {
        let mut client = self.clone();
        client.url = client.url.replace(from, to);
        client
    }
}

fn http_error(method: &Method, path: &str, status: StatusCode, body: &str) -> ApiError {
    let (error_code, message) = match serde_json::from_str::<PlatformErrorBody>(body) {
        Ok(parsed) => (
            parsed.error_code,
            parsed
                .message
                .or(parsed.error)
                .unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (None, body.to_string()),
    };

    ApiError::Http {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        error_code,
        message,
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn perform_query(
        &self,
        method: Method,
        path: &str,
        data: Option<Value>,
    ) -> ApiResult<Value> {
        let url = format!("{}{}", self.url, path);
        tracing::debug!(%method, %url, "performing query");

        let mut request = self.http.request(method.clone(), &url);
        request = match &self.auth {
            Some(Auth::Token(token)) => request.bearer_auth(token),
            Some(Auth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        };
        if let Some(data) = &data {
            request = if method == Method::GET {
                request.query(data)
            } else {
                request.json(data)
            };
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(http_error(&method, path, status, &body));
        }

        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DatabricksConfig {
        DatabricksConfig {
            host: "https://example.cloud.databricks.com/".to_string(),
            token: Some("dapi123".to_string()),
            ..DatabricksConfig::default()
        }
    }

    #[test]
    fn base_url_targets_v2() {
        let client = ApiClient::from_config(&config(), "dbx-").unwrap();
        assert_eq!(
            client.url(),
            "https://example.cloud.databricks.com/api/2.0"
        );
    }

    #[test]
    fn api_prefix_swap_leaves_original_untouched() {
        let client = ApiClient::from_config(&config(), "dbx-").unwrap();
        let legacy = client.with_api_prefix(API_V2_PREFIX, API_V1_PREFIX);
        assert_eq!(
            legacy.url(),
            "https://example.cloud.databricks.com/api/1.2"
        );
        assert_eq!(
            client.url(),
            "https://example.cloud.databricks.com/api/2.0"
        );
    }

    #[test]
    fn http_error_parses_platform_body() {
        let err = http_error(
            &Method::GET,
            "/dbfs/get-status",
            StatusCode::NOT_FOUND,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"No file or directory exists on path /x."}"#,
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("No file or directory exists"));
    }

    #[test]
    fn resource_code_counts_as_not_found_on_other_statuses() {
        let err = http_error(
            &Method::GET,
            "/mlflow/experiments/get-by-name",
            StatusCode::BAD_REQUEST,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"missing"}"#,
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let err = http_error(
            &Method::POST,
            "/contexts/create",
            StatusCode::BAD_GATEWAY,
            "upstream unavailable",
        );
        assert!(err.is_http());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("upstream unavailable"));
    }
}
