use crate::api::DEFAULT_BASE_URL;
use crate::images::{DEFAULT_BUCKET, DEFAULT_INTERNAL_HOST, DEFAULT_PUBLIC_ORIGIN};
use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".orchid";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Catalog API connection
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Object storage serving orchid images
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImagesConfig {
    #[serde(default)]
    pub public_origin: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub internal_host: Option<String>,
}

/// External staff directory. The employees page is unavailable without it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmployeesConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub employees: EmployeesConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from default paths.
    /// Priority: local (.orchid/config.local.toml) > project (.orchid/config.toml)
    /// > user (~/.orchid/config.toml). `extra` is applied last.
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(home) = dirs::home_dir() {
            layers.push(home.join(CONFIG_DIR).join("config.toml"));
        }
        layers.push(Path::new(CONFIG_DIR).join("config.toml"));
        layers.push(Path::new(CONFIG_DIR).join("config.local.toml"));

        let mut config = Self::load_layers(&layers)?;
        if let Some(path) = extra {
            // an explicitly named file must exist
            config.merge(Self::load_from(path)?);
        }
        Ok(config)
    }

    /// Merge the given files in order, skipping missing ones
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Config::default();
        for path in paths {
            if path.exists() {
                config.merge(Self::load_from(path)?);
            }
        }
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Config) {
        if other.api.base_url.is_some() {
            self.api.base_url = other.api.base_url;
        }
        if other.api.timeout_secs.is_some() {
            self.api.timeout_secs = other.api.timeout_secs;
        }

        if other.images.public_origin.is_some() {
            self.images.public_origin = other.images.public_origin;
        }
        if other.images.bucket.is_some() {
            self.images.bucket = other.images.bucket;
        }
        if other.images.internal_host.is_some() {
            self.images.internal_host = other.images.internal_host;
        }

        if other.employees.url.is_some() {
            self.employees.url = other.employees.url;
        }
        if other.session.file.is_some() {
            self.session.file = other.session.file;
        }
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn public_origin(&self) -> &str {
        self.images
            .public_origin
            .as_deref()
            .unwrap_or(DEFAULT_PUBLIC_ORIGIN)
    }

    pub fn bucket(&self) -> &str {
        self.images.bucket.as_deref().unwrap_or(DEFAULT_BUCKET)
    }

    pub fn internal_host(&self) -> &str {
        self.images
            .internal_host
            .as_deref()
            .unwrap_or(DEFAULT_INTERNAL_HOST)
    }

    pub fn employees_url(&self) -> Option<&str> {
        self.employees.url.as_deref().filter(|u| !u.is_empty())
    }

    /// Session file, `~/.orchid/session.json` unless configured
    pub fn session_file(&self) -> PathBuf {
        match &self.session.file {
            Some(path) => path.clone(),
            None => user_dir().join("session.json"),
        }
    }

    /// Validate the configuration and return all errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("api.base_url", Some(self.base_url())),
            ("images.public_origin", Some(self.public_origin())),
            ("employees.url", self.employees_url()),
        ] {
            let Some(value) = value else { continue };
            match url::Url::parse(value) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                Ok(u) => errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("unsupported scheme '{}' in '{}'", u.scheme(), value),
                }),
                Err(e) => errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("invalid URL '{}': {}", value, e),
                }),
            }
        }

        if self.api.timeout_secs == Some(0) {
            errors.push(ValidationError {
                field: "api.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        if self.bucket().trim_matches('/').is_empty() {
            errors.push(ValidationError {
                field: "images.bucket".to_string(),
                message: "bucket name cannot be empty".to_string(),
            });
        }
        if self.internal_host().is_empty() {
            errors.push(ValidationError {
                field: "images.internal_host".to_string(),
                message: "internal host cannot be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `~/.orchid`, or `./.orchid` when there is no home directory
pub fn user_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
}
