//! HTTP collaborator used by the request path.

use async_trait::async_trait;

use crate::{TransportError, endpoint::HttpMethod};

/// A fully resolved HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Serialized JSON body; always `None` for GET and HEAD.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Performs HTTP round-trips.
///
/// Implement this trait to plug in a different HTTP stack; failures to
/// reach the server are reported as [`TransportError::Network`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute one request.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_client::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
pub(crate) mod reqwest_client {
    use async_trait::async_trait;
    use reqwest::{
        Client, Method,
        header::{HeaderMap, HeaderName, HeaderValue},
    };

    use super::{HttpClient, HttpRequest, HttpResponse};
    use crate::{BridgeConfig, TransportError, endpoint::HttpMethod};

    /// [`HttpClient`] backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestHttpClient {
        client: Client,
    }

    impl ReqwestHttpClient {
        /// Build a client with the configured timeouts.
        pub fn new(config: &BridgeConfig) -> Result<Self, TransportError> {
            let client = Client::builder()
                .connect_timeout(config.connect_timeout)
                .timeout(config.request_timeout)
                .build()
                .map_err(|e| {
                    TransportError::config(format!("Failed to create HTTP client: {e}"))
                })?;
            Ok(Self { client })
        }

        /// Wrap an existing client.
        #[must_use]
        pub const fn from_client(client: Client) -> Self {
            Self { client }
        }
    }

    pub(crate) fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::config(format!("Invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::config(format!("Invalid header value for '{name}': {e}"))
            })?;
            map.insert(header, value);
        }
        Ok(map)
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    #[async_trait]
    impl HttpClient for ReqwestHttpClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut builder = self
                .client
                .request(method(request.method), &request.url)
                .headers(header_map(&request.headers)?);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                TransportError::network(format!("{} {} failed: {e}", request.method, request.url))
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                TransportError::network(format!("Failed to read response body: {e}"))
            })?;

            Ok(HttpResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            })
        }
    }
}
