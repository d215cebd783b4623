//! Configuration file handling for i3x-cli

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server used when neither flags nor the config file name one
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default server URL
    pub server: Option<String>,
    /// API key sent as `X-API-Key`
    pub api_key: Option<String>,
    /// API secret sent as `X-API-Secret`
    pub api_secret: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

/// Values given on the command line (or through `I3X_*` variables)
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides<'a> {
    pub server: Option<&'a str>,
    pub api_key: Option<&'a str>,
    pub api_secret: Option<&'a str>,
    pub output: Option<&'a str>,
    pub no_color: bool,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("i3x-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &ArgOverrides<'_>) -> MergedConfig {
        MergedConfig {
            server: args
                .server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            api_key: args.api_key.map(String::from).or_else(|| self.api_key.clone()),
            api_secret: args
                .api_secret
                .map(String::from)
                .or_else(|| self.api_secret.clone()),
            output: args
                .output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: args.no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub output: String,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server = "https://i3x.plant.local"
api_key = "key"
output = "json"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.as_deref(), Some("https://i3x.plant.local"));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.api_secret, None);
        assert_eq!(config.output.as_deref(), Some("json"));
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = [").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            server: Some("http://from-file".to_string()),
            api_key: Some("file-key".to_string()),
            api_secret: Some("file-secret".to_string()),
            output: Some("csv".to_string()),
            no_color: Some(true),
        };

        let merged = config.merge_with_args(&ArgOverrides {
            server: Some("http://from-args"),
            api_key: Some("arg-key"),
            ..Default::default()
        });

        assert_eq!(merged.server, "http://from-args");
        assert_eq!(merged.api_key.as_deref(), Some("arg-key"));
        assert_eq!(merged.api_secret.as_deref(), Some("file-secret"));
        assert_eq!(merged.output, "csv");
        assert!(merged.no_color);
    }

    #[test]
    fn test_defaults_when_empty() {
        let merged = Config::default().merge_with_args(&ArgOverrides::default());
        assert_eq!(merged.server, DEFAULT_SERVER);
        assert_eq!(merged.output, "table");
        assert_eq!(merged.api_key, None);
        assert!(!merged.no_color);
    }
}
