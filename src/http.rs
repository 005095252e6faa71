//! HTTP transport abstraction for the request layer.
//!
//! Keeps the dispatcher independent of `reqwest` so the refresh and replay
//! logic can be driven by scripted transports in tests.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::config::ApiConfig;
use crate::credential::Credential;
use crate::error::{AuthError, AuthResult};

/// A replayable description of an outbound request.
///
/// Specs are plain data; the bearer credential is attached at send time, never
/// baked into the spec, so a replay after renewal picks up the fresh one.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Extra headers beyond Authorization
    pub headers: HashMap<String, String>,
    /// Optional JSON body
    pub body: Option<Value>,
}

impl RequestSpec {
    /// Create a spec with the given method and path
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET spec
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST spec
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Add a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// How the dispatcher should treat a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Pass the response through to the caller
    Success,
    /// HTTP 401: the credential was rejected, renewal may recover this call
    AuthFailure,
    /// Any other error status: pass through as an error, no refresh attempted
    OtherFailure,
}

/// Response surfaced by a transport
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_str(&self.body)
            .map_err(|_| AuthError::invalid_response(format!("body ({})", self.status)))
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Classify this response for the dispatcher
    pub fn disposition(&self) -> Disposition {
        if self.status == StatusCode::UNAUTHORIZED {
            Disposition::AuthFailure
        } else if self.status.is_client_error() || self.status.is_server_error() {
            Disposition::OtherFailure
        } else {
            Disposition::Success
        }
    }
}

/// Transport seam between the dispatcher and the network
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request, attaching `Authorization: Bearer` when a credential is
    /// given. Returns the response whatever its status; only network-level
    /// failures are errors.
    async fn send(
        &self,
        spec: &RequestSpec,
        bearer: Option<&Credential>,
    ) -> AuthResult<HttpResponse>;
}

/// `reqwest`-backed transport.
///
/// The client is built with its cookie store enabled so the server-held
/// session cookie (the ambient evidence the renewal endpoint relies on) rides
/// along on every call without this layer touching it.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Build a transport with its own client from the given config
    pub fn new(config: &ApiConfig) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| AuthError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Build a transport around an existing client (shared cookie jar)
    pub fn with_client(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        spec: &RequestSpec,
        bearer: Option<&Credential>,
    ) -> AuthResult<HttpResponse> {
        let url = self.url_for(&spec.path);
        trace!(method = %spec.method, url = %url, "sending request");

        let mut builder = self.client.request(spec.method.clone(), &url);

        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }

        let mut header_map = HeaderMap::new();
        for (key, value) in &spec.headers {
            let name = HeaderName::from_str(key)
                .map_err(|_| AuthError::transport(format!("invalid header name: {}", key)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| AuthError::transport(format!("invalid header value for {}", key)))?;
            header_map.insert(name, value);
        }
        if let Some(credential) = bearer {
            let value = HeaderValue::from_str(&credential.bearer_header())
                .map_err(|_| AuthError::transport("credential is not a valid header value"))?;
            header_map.insert(AUTHORIZATION, value);
        }
        builder = builder.headers(header_map);

        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_classifies_statuses() {
        let response = |status| HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        };

        assert_eq!(response(StatusCode::OK).disposition(), Disposition::Success);
        assert_eq!(
            response(StatusCode::UNAUTHORIZED).disposition(),
            Disposition::AuthFailure
        );
        assert_eq!(
            response(StatusCode::FORBIDDEN).disposition(),
            Disposition::OtherFailure
        );
        assert_eq!(
            response(StatusCode::INTERNAL_SERVER_ERROR).disposition(),
            Disposition::OtherFailure
        );
    }

    #[test]
    fn spec_builder_accumulates() {
        let spec = RequestSpec::post("/chats")
            .with_query("limit", "50")
            .with_header("x-request-id", "abc")
            .with_body(serde_json::json!({"name": "general"}));

        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.query, vec![("limit".to_string(), "50".to_string())]);
        assert_eq!(spec.headers.get("x-request-id").unwrap(), "abc");
        assert!(spec.body.is_some());
    }

    #[tokio::test]
    async fn reqwest_transport_attaches_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/chats")
            .match_header("authorization", "Bearer tok-123")
            .with_status(200)
            .with_body(r#"{"chats":[]}"#)
            .create_async()
            .await;

        let config = ApiConfig::default().with_base_url(server.url());
        let transport = ReqwestTransport::new(&config).unwrap();
        let credential = Credential::new("tok-123");

        let response = transport
            .send(&RequestSpec::get("/chats"), Some(&credential))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.disposition(), Disposition::Success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reqwest_transport_passes_401_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chats")
            .with_status(401)
            .with_body(r#"{"error":"token expired"}"#)
            .create_async()
            .await;

        let config = ApiConfig::default().with_base_url(server.url());
        let transport = ReqwestTransport::new(&config).unwrap();

        let response = transport
            .send(&RequestSpec::get("/chats"), None)
            .await
            .unwrap();

        // A 401 is a response, not a transport error
        assert_eq!(response.disposition(), Disposition::AuthFailure);
    }
}
