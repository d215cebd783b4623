//! Client configuration with YAML support

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{I3xError, Result};

/// Client configuration
///
/// Can be loaded from YAML, JSON, or constructed programmatically
/// through [`ClientConfigBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the I3X server, including any path prefix
    pub base_url: String,

    /// API credentials sent with every request (optional)
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// API credential pair
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Sent as `X-API-Key`
    pub api_key: String,
    /// Sent as `X-API-Secret` when present
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Deadline for a request/response call, and for the header phase of a stream
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// How long stopping a subscription stream waits for its reader to exit
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
            stop_grace_ms: default_stop_grace(),
        }
    }
}

impl TimeoutsConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_stop_grace() -> u64 {
    5_000
}

impl ClientConfig {
    /// Configuration with default timeouts and no credentials
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            timeouts: TimeoutsConfig::default(),
        }
    }

    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            I3xError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| I3xError::Config(e.to_string()))
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| I3xError::Config(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| I3xError::Config(e.to_string()))
    }

    /// Base URL without trailing slashes; request paths are appended to it verbatim
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check that the base URL is an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(self.normalized_base_url())?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(I3xError::Config(format!(
                "unsupported URL scheme '{}', expected http or https",
                other
            ))),
        }
    }
}

/// Builder for ClientConfig
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(base_url),
        }
    }

    /// Set the API key and optional secret
    pub fn credentials(mut self, api_key: impl Into<String>, api_secret: Option<String>) -> Self {
        self.config.credentials = Some(Credentials {
            api_key: api_key.into(),
            api_secret,
        });
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set the stream stop grace period in milliseconds
    pub fn stop_grace_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.stop_grace_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
base_url: "https://i3x.example.com/api/v1/"
credentials:
  api_key: "key-123"
  api_secret: "s3cret"
timeouts:
  request_ms: 5000
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.normalized_base_url(), "https://i3x.example.com/api/v1");
        let creds = config.credentials.unwrap();
        assert_eq!(creds.api_key, "key-123");
        assert_eq!(creds.api_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.timeouts.request_ms, 5000);
        // Unspecified values keep their defaults
        assert_eq!(config.timeouts.connect_ms, 10_000);
        assert_eq!(config.timeouts.stop_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_json_parsing() {
        let config = ClientConfig::from_json(r#"{"base_url": "http://localhost:8080"}"#).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.timeouts.request(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder("http://localhost:8080")
            .credentials("k", None)
            .request_timeout_ms(1_000)
            .connect_timeout_ms(500)
            .stop_grace_ms(250)
            .build();

        assert_eq!(config.timeouts.request(), Duration::from_secs(1));
        assert_eq!(config.timeouts.connect(), Duration::from_millis(500));
        assert_eq!(config.timeouts.stop_grace(), Duration::from_millis(250));
        assert!(config.credentials.unwrap().api_secret.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::new("http://localhost:8080").validate().is_ok());
        assert!(ClientConfig::new("https://host/prefix/").validate().is_ok());
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://host").validate().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url: http://10.0.0.5:9000").unwrap();

        let config = ClientConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5:9000");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ClientConfig::from_yaml_file("/nonexistent/i3x.yaml").unwrap_err();
        assert!(matches!(err, I3xError::Config(_)));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = ClientConfig::builder("http://h")
            .credentials("top-secret-key", Some("hidden".into()))
            .build();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("top-secret-key"));
        assert!(!debug.contains("hidden"));
    }

    #[test]
    fn test_to_yaml() {
        let yaml = ClientConfig::new("http://localhost:8080").to_yaml().unwrap();
        assert!(yaml.contains("base_url"));
        assert!(yaml.contains("http://localhost:8080"));
    }
}
