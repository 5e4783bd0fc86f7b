//! Configuration loading, validation, and management for narragraph.
//!
//! Loads configuration from `~/.narragraph/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use narragraph_core::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Values shipped in `.env` templates that must never be sent as a key.
const PLACEHOLDER_KEYS: [&str; 3] = [
    "your-openai-api-key-here",
    "your-chatglm-api-key-here",
    "your-small-api-key-here",
];

/// The root configuration structure.
///
/// Maps directly to `~/.narragraph/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by all providers (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider selected at startup
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Provider-specific overrides
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Prompt task behaviour
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Sentence segmentation
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// HTTP transport
    #[serde(default)]
    pub http: HttpConfig,

    /// Telemetry event logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_provider() -> String {
    "openai".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("providers", &self.providers)
            .field("tasks", &self.tasks)
            .field("segmenter", &self.segmenter)
            .field("http", &self.http)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// Per-provider overrides.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Replaces the profile's base endpoint (e.g. a proxy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Whole-attempt retries for structured tasks
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base back-off; retry `k` waits `k * retry_backoff_ms`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Sentences shorter than this (in characters) are merged
    #[serde(default = "default_min_sentence_chars")]
    pub min_sentence_chars: usize,
}

fn default_min_sentence_chars() -> usize {
    20
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: default_min_sentence_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether prompt events are logged
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.narragraph/config.toml).
    ///
    /// `NARRAGRAPH_PROVIDER` overrides the configured default provider.
    /// API keys are resolved lazily by [`AppConfig::api_key_for`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(provider) = std::env::var("NARRAGRAPH_PROVIDER") {
            config.default_provider = provider;
            config.validate()?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".narragraph")
    }

    /// The provider selected at startup.
    pub fn provider_id(&self) -> Result<ProviderId, ConfigError> {
        self.default_provider
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected one of: openai, chatglm, small)",
                self.default_provider
            )))
    }

    /// Resolve the API key for a provider.
    ///
    /// Order: `[providers.<id>].api_key`, top-level `api_key`,
    /// `NARRAGRAPH_API_KEY`, then the provider's own variable.
    pub fn api_key_for(&self, provider: ProviderId) -> Option<String> {
        self.api_key_with_env(provider, |name| std::env::var(name).ok())
    }

    fn api_key_with_env(
        &self,
        provider: ProviderId,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        self.providers
            .get(provider.as_str())
            .and_then(|p| p.api_key.clone())
            .filter(|k| is_usable_key(k))
            .or_else(|| self.api_key.clone().filter(|k| is_usable_key(k)))
            .or_else(|| env("NARRAGRAPH_API_KEY").filter(|k| is_usable_key(k)))
            .or_else(|| env(provider_env_var(provider)).filter(|k| is_usable_key(k)))
    }

    /// Endpoint override for a provider, if configured.
    pub fn api_url_for(&self, provider: ProviderId) -> Option<String> {
        self.providers
            .get(provider.as_str())
            .and_then(|p| p.api_url.clone())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.provider_id()?;

        for name in self.providers.keys() {
            if name.parse::<ProviderId>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "[providers.{name}] does not name a known provider"
                )));
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "http.timeout_secs must be > 0".into(),
            ));
        }

        if self.segmenter.min_sentence_chars == 0 {
            return Err(ConfigError::ValidationError(
                "segmenter.min_sentence_chars must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            providers: HashMap::new(),
            tasks: TaskConfig::default(),
            segmenter: SegmenterConfig::default(),
            http: HttpConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Environment variable holding a provider's own key.
pub fn provider_env_var(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAi => "OPENAI_API_KEY",
        ProviderId::ChatGlm => "CHATGLM_API_KEY",
        ProviderId::Small => "SMALL_API_KEY",
    }
}

fn is_usable_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && !PLACEHOLDER_KEYS.contains(&key)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for narragraph_core::Error {
    fn from(e: ConfigError) -> Self {
        Self::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.tasks.max_retries, 2);
        assert_eq!(config.tasks.retry_backoff_ms, 1000);
        assert_eq!(config.segmenter.min_sentence_chars, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.http.timeout_secs, config.http.timeout_secs);
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = AppConfig {
            default_provider: "anthropic".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_error_converts_to_domain_error() {
        let config = AppConfig {
            default_provider: "anthropic".into(),
            ..AppConfig::default()
        };
        let err: narragraph_core::Error = config.provider_id().unwrap_err().into();
        match err {
            narragraph_core::Error::Config { message } => assert!(message.contains("anthropic")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openai");
    }

    #[test]
    fn load_from_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "chatglm"

[providers.chatglm]
api_key = "glm-secret"
api_url = "https://proxy.local/v4"

[tasks]
max_retries = 4
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.provider_id().unwrap(), ProviderId::ChatGlm);
        assert_eq!(config.tasks.max_retries, 4);
        assert_eq!(config.tasks.retry_backoff_ms, 1000);
        assert_eq!(
            config.api_url_for(ProviderId::ChatGlm).as_deref(),
            Some("https://proxy.local/v4")
        );
        assert!(config.api_url_for(ProviderId::OpenAi).is_none());
    }

    #[test]
    fn unknown_provider_section_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[providers.mystery]\napi_key = \"k\"").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn api_key_resolution_order() {
        let mut config = AppConfig::default();
        let env = |name: &str| match name {
            "NARRAGRAPH_API_KEY" => Some("generic".to_string()),
            "SMALL_API_KEY" => Some("small-env".to_string()),
            _ => None,
        };

        assert_eq!(
            config.api_key_with_env(ProviderId::Small, env).as_deref(),
            Some("generic")
        );

        config.api_key = Some("top-level".into());
        assert_eq!(
            config.api_key_with_env(ProviderId::Small, env).as_deref(),
            Some("top-level")
        );

        config.providers.insert(
            "small".into(),
            ProviderConfig {
                api_key: Some("per-provider".into()),
                api_url: None,
            },
        );
        assert_eq!(
            config.api_key_with_env(ProviderId::Small, env).as_deref(),
            Some("per-provider")
        );
    }

    #[test]
    fn provider_specific_env_var_is_last_resort() {
        let config = AppConfig::default();
        let env = |name: &str| (name == "CHATGLM_API_KEY").then(|| "glm-env".to_string());
        assert_eq!(
            config.api_key_with_env(ProviderId::ChatGlm, env).as_deref(),
            Some("glm-env")
        );
        assert!(config.api_key_with_env(ProviderId::OpenAi, env).is_none());
    }

    #[test]
    fn placeholder_keys_are_ignored() {
        let config = AppConfig {
            api_key: Some("your-openai-api-key-here".into()),
            ..AppConfig::default()
        };
        let env = |name: &str| (name == "OPENAI_API_KEY").then(|| "  ".to_string());
        assert!(config.api_key_with_env(ProviderId::OpenAi, env).is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openai"));
        assert!(toml_str.contains("min_sentence_chars"));
    }
}
