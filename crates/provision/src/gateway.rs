//! Query gateway for the Vultr v1 REST API.
//!
//! Every provider call in this crate goes through [`Query::query`]. The
//! credential travels as the `api_key` query parameter and is replaced by
//! [`REDACTED`] in every log line and error message produced here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
pub use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// Default management host for the Vultr API.
pub const DEFAULT_MANAGEMENT_HOST: &str = "api.vultr.com";

/// Marker substituted for the credential in logs and errors.
pub const REDACTED: &str = "XXXXXXXXXX";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request body for mutating calls.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(Value),
}

/// Decoded provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 2xx with a JSON body.
    Data(Value),
    /// 2xx with an empty body (or `{}`). Success for action-style endpoints.
    NoContent,
}

impl Reply {
    /// Whether the provider answered with no content.
    #[must_use]
    pub const fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent)
    }

    /// Borrow the decoded body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::NoContent => None,
        }
    }

    /// Look up a top-level field of an object body.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body().and_then(|body| body.get(key))
    }

    /// Status code embedded in the body (`"status"`), defaulting to 200.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.field("status")
            .and_then(|status| match status {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .and_then(|status| u16::try_from(status).ok())
            .unwrap_or(200)
    }

    /// Error description embedded in the body, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.field("error").map(|error| match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Convert into an ID-keyed mapping.
    ///
    /// The v1 API answers empty listings with `[]`, so anything that is not an
    /// object becomes an empty map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Data(Value::Object(map)) => map,
            Self::Data(_) | Self::NoContent => Map::new(),
        }
    }
}

/// The single "perform authenticated request" primitive.
#[async_trait]
pub trait Query: Send + Sync {
    /// Issue exactly one request against `path` (relative to the API root).
    async fn query(
        &self,
        path: &str,
        method: Method,
        body: Option<RequestBody>,
    ) -> Result<Reply, ProvisionError>;

    /// Issue a GET request.
    async fn get(&self, path: &str) -> Result<Reply, ProvisionError> {
        self.query(path, Method::GET, None).await
    }

    /// Issue a form-encoded POST request.
    async fn post_form(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<Reply, ProvisionError> {
        self.query(path, Method::POST, Some(RequestBody::Form(fields)))
            .await
    }
}

/// Vultr v1 API gateway.
#[derive(Clone)]
pub struct VultrGateway {
    /// HTTP client.
    client: Client,
    /// API root, e.g. `https://api.vultr.com/v1`.
    base_url: String,
    /// API key for authentication.
    api_key: String,
}

impl std::fmt::Debug for VultrGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VultrGateway")
            .field("base_url", &self.base_url)
            .field("api_key", &REDACTED)
            .finish()
    }
}

impl VultrGateway {
    /// Create a gateway for `https://{management_host}/v1`.
    ///
    /// # Errors
    /// Returns error if the API key is blank or the HTTP client cannot be created.
    pub fn new(
        api_key: impl Into<String>,
        management_host: &str,
    ) -> Result<Self, ProvisionError> {
        let host = management_host.trim().trim_end_matches('/');
        let host = if host.is_empty() {
            DEFAULT_MANAGEMENT_HOST
        } else {
            host
        };
        Self::with_base_url(api_key, format!("https://{host}/v1"))
    }

    /// Create a gateway against an explicit API root.
    ///
    /// # Errors
    /// Returns error if the API key is blank or the HTTP client cannot be created.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ProvisionError::Config("api_key is required".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProvisionError::Config(e.without_url().to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL as it may appear in logs.
    fn redacted_url(&self, path: &str) -> String {
        format!("{}?api_key={REDACTED}", self.url(path))
    }

    /// Replace every occurrence of the credential in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.api_key, REDACTED)
    }

    fn transport_error(&self, err: reqwest::Error) -> ProvisionError {
        ProvisionError::Transport(self.redact(&err.without_url().to_string()))
    }
}

#[async_trait]
impl Query for VultrGateway {
    async fn query(
        &self,
        path: &str,
        method: Method,
        body: Option<RequestBody>,
    ) -> Result<Reply, ProvisionError> {
        debug!(method = %method, url = %self.redacted_url(path), "Vultr API request");

        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .query(&[("api_key", self.api_key.as_str())]);
        request = match body {
            Some(RequestBody::Form(fields)) => request.form(&fields),
            Some(RequestBody::Json(value)) => request.json(&value),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = self.redact(text.trim());
            warn!(
                method = %method,
                url = %self.redacted_url(path),
                status = status.as_u16(),
                message = %message,
                "Vultr API returned an error"
            );
            return Err(ProvisionError::ProviderRejected {
                status: status.as_u16(),
                message,
            });
        }

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            debug!(status = status.as_u16(), "Vultr API returned no content");
            return Ok(Reply::NoContent);
        }

        serde_json::from_str(trimmed).map(Reply::Data).map_err(|e| {
            warn!(error = %e, "Failed to parse Vultr API response");
            ProvisionError::Serialization(e)
        })
    }
}
