//! HTTP connection to an I3X server
//!
//! Owns the pooled HTTP client, base URL and credentials, and turns transport
//! failures and non-success statuses into [`I3xError`] values before they
//! reach the caller. Shared by the synchronous request path and every
//! subscription stream reader.

use parking_lot::RwLock;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{ClientConfig, Credentials, TimeoutsConfig};
use crate::error::{error_for_status, extract_error_message, I3xError, Result};

const API_KEY_HEADER: &str = "x-api-key";
const API_SECRET_HEADER: &str = "x-api-secret";

/// Lightweight catalog read used to verify the server is reachable
const PROBE_PATH: &str = "/namespaces";

/// Everything except unreserved characters is escaped, `/` included.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an element or subscription ID for use as a single path segment.
///
/// IDs such as `"plant/line-1"` must become `"plant%2Fline-1"` so they are
/// not split across two segments.
pub fn encode_path_segment(id: &str) -> String {
    utf8_percent_encode(id, PATH_SEGMENT).to_string()
}

/// Connection to an I3X server
///
/// Starts closed. [`open`](Self::open) builds the HTTP client and checks the
/// server; a failed check leaves the connection closed again.
#[derive(Debug)]
pub struct Connection {
    base_url: String,
    credentials: Option<Credentials>,
    timeouts: TimeoutsConfig,
    client: RwLock<Option<Client>>,
}

impl Connection {
    /// Create a closed connection from configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            base_url: config.normalized_base_url().to_string(),
            credentials: config.credentials.clone(),
            timeouts: config.timeouts.clone(),
            client: RwLock::new(None),
        })
    }

    /// Base URL with trailing slashes removed
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_open(&self) -> bool {
        self.client.read().is_some()
    }

    /// Open the connection and verify the server responds.
    ///
    /// No-op when already open. If that check fails the client is torn down
    /// before the error is returned.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let client = self.build_client()?;
        *self.client.write() = Some(client);

        debug!("Probing server with {}", PROBE_PATH);
        if let Err(e) = self.get(PROBE_PATH, None).await {
            debug!(error = %e, "Probe failed, closing connection");
            self.close();
            return Err(e);
        }

        Ok(())
    }

    /// Drop the HTTP client. Idempotent.
    pub fn close(&self) {
        if self.client.write().take().is_some() {
            debug!(base_url = %self.base_url, "Connection closed");
        }
    }

    fn build_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Some(creds) = &self.credentials {
            headers.insert(API_KEY_HEADER, header_value(&creds.api_key)?);
            if let Some(secret) = &creds.api_secret {
                headers.insert(API_SECRET_HEADER, header_value(secret)?);
            }
        }

        // No client-wide timeout: it would also cut off long-lived streams.
        Client::builder()
            .connect_timeout(self.timeouts.connect())
            .default_headers(headers)
            .build()
            .map_err(|e| I3xError::Config(format!("Failed to build HTTP client: {}", e)))
    }

    fn client(&self) -> Result<Client> {
        self.client.read().clone().ok_or(I3xError::NotConnected)
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path)).map_err(Into::into)
    }

    /// Issue a request and decode the response.
    ///
    /// Returns `None` for 204 No Content, a JSON value for JSON bodies and a
    /// JSON string holding the raw text for anything else.
    #[instrument(skip(self, query, body))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let client = self.client()?;
        let url = self.url(path)?;
        debug!("{} {}", method, url);

        let mut builder = client.request(method, url).timeout(self.timeouts.request());
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        Self::decode_response(response).await
    }

    /// Issue a request and deserialize a non-empty response body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> Result<T> {
        let value = self
            .request(method, path, query, body)
            .await?
            .ok_or_else(|| I3xError::Decode(format!("empty response from {}", path)))?;

        serde_json::from_value(value).map_err(|e| I3xError::Decode(e.to_string()))
    }

    pub async fn get(&self, path: &str, query: Option<&[(&str, String)]>) -> Result<Option<Value>> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        self.request(Method::POST, path, None, body).await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        self.request(Method::PUT, path, None, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Option<Value>> {
        self.request(Method::DELETE, path, None, None).await
    }

    /// Open a long-lived streaming GET.
    ///
    /// Only the header phase is bounded by the request timeout. The returned
    /// response body has not been read; the caller owns it and closing it.
    #[instrument(skip(self))]
    pub async fn open_stream(&self, path: &str) -> Result<Response> {
        let client = self.client()?;
        let url = self.url(path)?;
        debug!("Connecting to event stream: {}", url);

        let send = client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send();

        let response = tokio::time::timeout(self.timeouts.request(), send)
            .await
            .map_err(|_| {
                I3xError::RequestTimeout(format!(
                    "no response from {} within {}ms",
                    path, self.timeouts.request_ms
                ))
            })??;

        if is_error_status(response.status()) {
            return Err(Self::error_from_response(response).await);
        }

        Ok(response)
    }

    async fn decode_response(response: Response) -> Result<Option<Value>> {
        let status = response.status();

        if is_error_status(status) {
            return Err(Self::error_from_response(response).await);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let text = response.text().await?;
        if is_json {
            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| I3xError::Decode(e.to_string()))
        } else {
            Ok(Some(Value::String(text)))
        }
    }

    async fn error_from_response(response: Response) -> I3xError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        } else {
            extract_error_message(&body)
        };

        error_for_status(status, message)
    }
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| I3xError::Config(format!("Invalid credential header value: {}", e)))
}
