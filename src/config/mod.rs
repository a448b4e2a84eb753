// Configuration module

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default maximum upload size (100 MiB)
fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

/// Default request quota per rate-limit window
fn default_rate_limit_quota() -> u32 {
    10
}

/// Default rate-limit window length in seconds
fn default_rate_limit_window_secs() -> u64 {
    60
}

/// Default Ghostscript invocation timeout in seconds
fn default_engine_timeout_secs() -> u64 {
    120
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("compressed")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ghostscript: GhostscriptConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub build: BuildInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Per-client rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window per client (0 disables rate limiting)
    #[serde(default = "default_rate_limit_quota")]
    pub quota: u32,
    /// Window length in seconds
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory where uploaded documents are staged
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory where compressed output is written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostscriptConfig {
    /// Ghostscript executable path or command name.
    /// When unset, the PATH is searched for a known candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Hard limit for a single compression run, in seconds
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Comma-separated `key:name` bindings. Empty or unset disables
    /// authentication; any configured key makes authentication fail-closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<String>,
}

/// Build metadata surfaced by `/healthz` and `/api/version`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: default_rate_limit_quota(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for GhostscriptConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_engine_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            storage: StorageConfig::default(),
            ghostscript: GhostscriptConfig::default(),
            auth: AuthConfig::default(),
            build: BuildInfo::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Parse a configuration file (YAML)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration for the process: the file when present, defaults
    /// otherwise, then environment overrides, then validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        let vars: HashMap<String, String> = std::env::vars().collect();
        config.apply_overrides(&vars);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-variable overrides for the documented settings.
    ///
    /// Unparseable numeric values keep the configured value and log a
    /// warning rather than aborting startup.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) {
        if let Some(value) = non_empty(vars, "BIND_ADDRESS") {
            self.server.address = value;
        }
        if let Some(value) = non_empty(vars, "PORT") {
            match value.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %value, "Ignoring unparseable PORT override"),
            }
        }
        if let Some(value) = non_empty(vars, "UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(value);
        }
        if let Some(value) = non_empty(vars, "OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(value);
        }
        if let Some(value) = non_empty(vars, "MAX_UPLOAD_BYTES") {
            match value.parse() {
                Ok(bytes) => self.limits.max_upload_bytes = bytes,
                Err(_) => {
                    tracing::warn!(value = %value, "Ignoring unparseable MAX_UPLOAD_BYTES override")
                }
            }
        }
        if let Some(value) = non_empty(vars, "RATE_LIMIT_QUOTA") {
            match value.parse() {
                Ok(quota) => self.limits.rate_limit.quota = quota,
                Err(_) => {
                    tracing::warn!(value = %value, "Ignoring unparseable RATE_LIMIT_QUOTA override")
                }
            }
        }
        if let Some(value) = non_empty(vars, "RATE_LIMIT_WINDOW_SECS") {
            match value.parse() {
                Ok(secs) => self.limits.rate_limit.window_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %value, "Ignoring unparseable RATE_LIMIT_WINDOW_SECS override")
                }
            }
        }
        if let Some(value) = non_empty(vars, "GHOSTSCRIPT_COMMAND") {
            self.ghostscript.command = Some(value);
        }
        if let Some(value) = non_empty(vars, "GHOSTSCRIPT_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.ghostscript.timeout_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %value, "Ignoring unparseable GHOSTSCRIPT_TIMEOUT_SECS override")
                }
            }
        }
        if let Some(value) = non_empty(vars, "API_KEYS") {
            self.auth.api_keys = Some(value);
        }
        if let Some(value) = non_empty(vars, "APP_VERSION") {
            self.build.version = Some(value);
        }
        if let Some(value) = non_empty(vars, "APP_COMMIT") {
            self.build.commit = Some(value);
        }
        if let Some(value) = non_empty(vars, "APP_BUILD_TIME") {
            self.build.build_time = Some(value);
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.limits.rate_limit.quota > 0 && self.limits.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "limits.rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.ghostscript.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ghostscript.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Version string reported by the HTTP surface
    pub fn app_version(&self) -> &str {
        self.build
            .version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize_empty_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.limits.rate_limit.quota, 10);
        assert_eq!(config.limits.rate_limit.window_secs, 60);
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.storage.output_dir, PathBuf::from("compressed"));
        assert!(config.ghostscript.command.is_none());
        assert_eq!(config.ghostscript.timeout_secs, 120);
        assert!(config.auth.api_keys.is_none());
    }

    #[test]
    fn test_config_deserialize_full() {
        let yaml = r#"
server:
  address: 127.0.0.1
  port: 9090
limits:
  max_upload_bytes: 1048576
  rate_limit:
    quota: 5
    window_secs: 30
storage:
  upload_dir: /tmp/in
  output_dir: /tmp/out
ghostscript:
  command: /usr/local/bin/gs
  timeout_secs: 45
auth:
  api_keys: "abc:alice,def:bob"
build:
  version: "2.3.4"
  commit: deadbeef
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.limits.max_upload_bytes, 1_048_576);
        assert_eq!(config.limits.rate_limit.quota, 5);
        assert_eq!(config.limits.rate_limit.window_secs, 30);
        assert_eq!(
            config.ghostscript.command.as_deref(),
            Some("/usr/local/bin/gs")
        );
        assert_eq!(config.ghostscript.timeout_secs, 45);
        assert_eq!(config.auth.api_keys.as_deref(), Some("abc:alice,def:bob"));
        assert_eq!(config.build.version.as_deref(), Some("2.3.4"));
        assert_eq!(config.build.commit.as_deref(), Some("deadbeef"));
        assert!(config.build.build_time.is_none());
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert("PORT".to_string(), "9000".to_string());
        vars.insert("MAX_UPLOAD_BYTES".to_string(), "2048".to_string());
        vars.insert("RATE_LIMIT_QUOTA".to_string(), "3".to_string());
        vars.insert("GHOSTSCRIPT_COMMAND".to_string(), "/opt/gs".to_string());
        vars.insert("API_KEYS".to_string(), "k1:ops".to_string());

        config.apply_overrides(&vars);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.limits.max_upload_bytes, 2048);
        assert_eq!(config.limits.rate_limit.quota, 3);
        assert_eq!(config.ghostscript.command.as_deref(), Some("/opt/gs"));
        assert_eq!(config.auth.api_keys.as_deref(), Some("k1:ops"));
    }

    #[test]
    fn test_env_overrides_ignore_unparseable_numbers() {
        let mut config = Config::default();
        let mut vars = HashMap::new();
        vars.insert("PORT".to_string(), "not-a-port".to_string());
        vars.insert("MAX_UPLOAD_BYTES".to_string(), "".to_string());

        config.apply_overrides(&vars);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.max_upload_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_max_upload() {
        let mut config = Config::default();
        config.limits.max_upload_bytes = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window_with_quota() {
        let mut config = Config::default();
        config.limits.rate_limit.window_secs = 0;

        assert!(config.validate().is_err());

        // A zero quota disables rate limiting, so the window is irrelevant
        config.limits.rate_limit.quota = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_version_falls_back_to_crate_version() {
        let config = Config::default();
        assert_eq!(config.app_version(), env!("CARGO_PKG_VERSION"));

        let mut pinned = Config::default();
        pinned.build.version = Some("9.9.9".to_string());
        assert_eq!(pinned.app_version(), "9.9.9");
    }
}
